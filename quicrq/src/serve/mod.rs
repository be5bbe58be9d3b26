//! Media serving within a node: the per-URL fragment cache, the registry
//! of published sources, and the upstream fetch backlog.

mod cache;
mod error;
mod fetch;
mod sources;

pub use cache::*;
pub use error::*;
pub use fetch::*;
pub use sources::*;
