use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Where a new subscription starts within the media.
///
/// Encoded as a single tag byte; a start point carries its coordinates
/// immediately after the tag.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Intent {
    /// Start from the first object of the group currently being produced.
    CurrentGroup,

    /// Wait for the next group boundary.
    NextGroup,

    /// Start exactly at the given (group, object).
    StartPoint { group_id: u64, object_id: u64 },
}

impl Intent {
    pub fn tag(&self) -> u8 {
        match self {
            Self::CurrentGroup => 0x0,
            Self::NextGroup => 0x1,
            Self::StartPoint { .. } => 0x2,
        }
    }
}

impl Decode for Intent {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        match u8::decode(r)? {
            0x0 => Ok(Self::CurrentGroup),
            0x1 => Ok(Self::NextGroup),
            0x2 => {
                let group_id = u64::decode(r)?;
                let object_id = u64::decode(r)?;
                Ok(Self::StartPoint {
                    group_id,
                    object_id,
                })
            }
            tag => Err(DecodeError::InvalidIntent(tag)),
        }
    }
}

impl Encode for Intent {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.tag().encode(w)?;
        if let Self::StartPoint {
            group_id,
            object_id,
        } = self
        {
            group_id.encode(w)?;
            object_id.encode(w)?;
        }
        Ok(())
    }
}
