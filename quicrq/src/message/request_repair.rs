use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Sent by a datagram-mode subscriber to name a missing fragment range.
///
/// The range must stay within a single object; the publisher retransmits it
/// on the control stream (or as another datagram if budget allows).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestRepair {
    pub group_id: u64,
    pub object_id: u64,

    /// First missing byte within the object.
    pub offset: u64,

    /// Number of missing bytes.
    pub length: u64,

    /// Whether the requested range ends the object.
    pub is_last_fragment: bool,
}

impl Decode for RequestRepair {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let group_id = u64::decode(r)?;
        let object_id = u64::decode(r)?;
        let offset = u64::decode(r)?;
        let length = u64::decode(r)?;
        let is_last_fragment = bool::decode(r)?;

        Ok(Self {
            group_id,
            object_id,
            offset,
            length,
            is_last_fragment,
        })
    }
}

impl Encode for RequestRepair {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.group_id.encode(w)?;
        self.object_id.encode(w)?;
        self.offset.encode(w)?;
        self.length.encode(w)?;
        self.is_last_fragment.encode(w)?;

        Ok(())
    }
}
