mod datagram;
mod object;

pub use datagram::*;
pub use object::*;
