use super::BoundsExceeded;

pub trait Encode {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError>;

    /// Helper: return an error if the buffer cannot hold enough bytes.
    fn encode_remaining<W: bytes::BufMut>(buf: &W, required: usize) -> Result<(), EncodeError> {
        let needed = required.saturating_sub(buf.remaining_mut());
        if needed > 0 {
            Err(EncodeError::More(needed))
        } else {
            Ok(())
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("short buffer")]
    More(usize),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("field bounds exceeded: {0}")]
    FieldBoundsExceeded(String),

    #[error("varint bounds exceeded")]
    BoundsExceeded(#[from] BoundsExceeded),
}
