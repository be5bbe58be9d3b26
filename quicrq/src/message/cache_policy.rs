use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Per-URL rule governing when cached fragments become eligible for eviction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EvictionPolicy {
    /// Keep a fragment until every attached subscriber has read past it.
    #[default]
    Retain = 0x0,

    /// On each new group boundary, discard everything below the new group.
    /// Catch-up subscribers join at a group boundary.
    Drop = 0x1,
}

impl Decode for EvictionPolicy {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        match u8::decode(r)? {
            0x0 => Ok(Self::Retain),
            0x1 => Ok(Self::Drop),
            policy => Err(DecodeError::InvalidPolicy(policy)),
        }
    }
}

impl Encode for EvictionPolicy {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        (*self as u8).encode(w)
    }
}

/// Sent by a publisher to declare the eviction policy of the media it is
/// pushing, ahead of the first fragment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CachePolicy {
    pub policy: EvictionPolicy,
}

impl Decode for CachePolicy {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let policy = EvictionPolicy::decode(r)?;
        Ok(Self { policy })
    }
}

impl Encode for CachePolicy {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.policy.encode(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};

    #[test]
    fn encode_decode() {
        let mut buf = BytesMut::new();

        let msg = CachePolicy {
            policy: EvictionPolicy::Drop,
        };
        msg.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x01]);
        let decoded = CachePolicy::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_invalid() {
        let mut buf: Bytes = vec![0x02u8].into();
        assert!(CachePolicy::decode(&mut buf).is_err());
    }
}
