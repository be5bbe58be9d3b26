use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// How fragments travel from publisher to subscriber.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TransportMode {
    /// Fragments ride the same bidirectional stream as the control messages.
    SingleStream = 0x1,

    /// Fragments are sent as QUIC datagrams, demultiplexed by media id.
    Datagram = 0x2,
}

impl Decode for TransportMode {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        match u8::decode(r)? {
            0x1 => Ok(Self::SingleStream),
            0x2 => Ok(Self::Datagram),
            mode => Err(DecodeError::InvalidMode(mode)),
        }
    }
}

impl Encode for TransportMode {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        (*self as u8).encode(w)
    }
}
