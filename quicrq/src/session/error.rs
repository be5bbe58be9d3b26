use crate::{coding, serve};

#[derive(thiserror::Error, Debug, Clone)]
pub enum SessionError {
    #[error("webtransport session: {0}")]
    Session(#[from] web_transport::SessionError),

    #[error("webtransport write: {0}")]
    Write(#[from] web_transport::WriteError),

    #[error("webtransport read: {0}")]
    Read(#[from] web_transport::ReadError),

    #[error("encode error: {0}")]
    Encode(#[from] coding::EncodeError),

    /// The peer sent bytes that do not match any message grammar.
    #[error("decode error: {0}")]
    Decode(#[from] coding::DecodeError),

    /// The message decoded but is not legal in the stream's current state.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(&'static str),

    /// A well-formed message carrying impossible values, like a repair
    /// range crossing an object boundary.
    #[error("malformed {0}")]
    Malformed(&'static str),

    #[error("serve error: {0}")]
    Serve(#[from] serve::ServeError),

    #[error("internal error")]
    Internal,
}

impl SessionError {
    /// The code attached to the stream (or connection) this error closes.
    pub fn code(&self) -> u64 {
        match self {
            Self::Decode(_) => 0x1,
            Self::Malformed(_) => 0x1,
            Self::UnexpectedMessage(_) => 0x2,
            Self::Serve(err) => err.code(),
            Self::Session(_) | Self::Write(_) | Self::Read(_) | Self::Encode(_) => 0x5,
            Self::Internal => 0x5,
        }
    }

    /// Whether the whole connection should come down, not just the stream.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Internal | Self::Session(_))
    }
}
