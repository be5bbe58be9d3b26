use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Sent by the publisher ahead of the first fragment when delivery does not
/// begin at (0, 0), so the consumer treats earlier objects as non-events.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StartPoint {
    pub group_id: u64,
    pub object_id: u64,
}

impl Decode for StartPoint {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let group_id = u64::decode(r)?;
        let object_id = u64::decode(r)?;

        Ok(Self {
            group_id,
            object_id,
        })
    }
}

impl Encode for StartPoint {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.group_id.encode(w)?;
        self.object_id.encode(w)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn encode_decode() {
        let mut buf = BytesMut::new();

        let msg = StartPoint {
            group_id: 2469,
            object_id: 123456,
        };
        msg.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x49, 0xa5, 0x80, 0x01, 0xe2, 0x40]);

        let decoded = StartPoint::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }
}
