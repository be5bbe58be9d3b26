//! A publish/subscribe media relay layered atop QUIC.
//!
//! Publishers register media under URL-shaped byte strings; subscribers
//! fetch them over a single stream or as datagrams, resuming at a group
//! boundary or an explicit start point. Every node caches the fragments it
//! receives, so relays serve any number of downstream subscribers from one
//! upstream subscription and late joiners synchronize at group boundaries.
//!
//! The crate is transport-core only: it speaks through a
//! [web_transport::Session] and leaves endpoint and TLS setup to the
//! embedder (see the companion native crate).

pub mod clock;
pub mod coding;
pub mod data;
pub mod message;
pub mod reassembly;
pub mod serve;
pub mod session;
pub mod watch;

/// The ALPN label negotiated by QUICRQ connections.
pub const ALPN: &[u8] = b"quicrq";
