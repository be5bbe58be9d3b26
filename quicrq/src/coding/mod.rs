mod decode;
mod encode;
mod integer;
mod url;
mod varint;

pub use decode::*;
pub use encode::*;
pub use url::*;
pub use varint::*;
