use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Fixed-size header carried at the front of each object's payload.
///
/// The transport never looks inside objects; this header exists for
/// embedders that need to stamp and compare media, like the test
/// publisher/consumer pair. 8 bytes big-endian: number, timestamp in
/// microseconds, content length.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ObjectHeader {
    /// Sequence number of the object within the media.
    pub number: u16,

    /// Production time of the object, in microseconds.
    pub timestamp: u32,

    /// Length of the content following the header.
    pub length: u16,
}

impl ObjectHeader {
    pub const SIZE: usize = 8;
}

impl Decode for ObjectHeader {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Self::decode_remaining(r, Self::SIZE)?;

        Ok(Self {
            number: r.get_u16(),
            timestamp: r.get_u32(),
            length: r.get_u16(),
        })
    }
}

impl Encode for ObjectHeader {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        Self::encode_remaining(w, Self::SIZE)?;

        w.put_u16(self.number);
        w.put_u32(self.timestamp);
        w.put_u16(self.length);

        Ok(())
    }
}
