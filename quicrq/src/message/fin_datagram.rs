use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Declares the end of a media: the final point is one past the last object.
///
/// Sent on the control stream of a datagram-mode subscription, and reused as
/// the terminator of single-stream subscriptions with a media id of 0.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FinDatagram {
    pub media_id: u64,

    /// Group of the first object that will never be sent.
    pub final_group_id: u64,

    /// Object id one past the last object of that group.
    pub final_object_id: u64,
}

impl Decode for FinDatagram {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let media_id = u64::decode(r)?;
        let final_group_id = u64::decode(r)?;
        let final_object_id = u64::decode(r)?;

        Ok(Self {
            media_id,
            final_group_id,
            final_object_id,
        })
    }
}

impl Encode for FinDatagram {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.media_id.encode(w)?;
        self.final_group_id.encode(w)?;
        self.final_object_id.encode(w)?;

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

        let msg = FinDatagram {
            media_id: 17,
            final_group_id: 17,
            final_object_id: 123456,
        };
        msg.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x11, 0x11, 0x80, 0x01, 0xe2, 0x40]);

        let decoded = FinDatagram::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }
}
