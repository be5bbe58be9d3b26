use super::BoundsExceeded;

pub trait Decode: Sized {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError>;

    /// Helper: return an error if the buffer does not contain enough bytes.
    fn decode_remaining<R: bytes::Buf>(buf: &R, required: usize) -> Result<(), DecodeError> {
        let needed = required.saturating_sub(buf.remaining());
        if needed > 0 {
            Err(DecodeError::More(needed))
        } else {
            Ok(())
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("fill the buffer")]
    More(usize),

    #[error("invalid message type: {0}")]
    InvalidMessage(u64),

    #[error("invalid value")]
    InvalidValue,

    #[error("invalid subscribe intent: {0}")]
    InvalidIntent(u8),

    #[error("invalid transport mode: {0}")]
    InvalidMode(u8),

    #[error("invalid cache policy: {0}")]
    InvalidPolicy(u8),

    #[error("field bounds exceeded: {0}")]
    FieldBoundsExceeded(String),

    #[error("varint bounds exceeded")]
    BoundsExceeded(#[from] BoundsExceeded),
}
