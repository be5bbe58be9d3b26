use super::{Decode, DecodeError, Encode, EncodeError};

/// The largest value representable as a QUIC variable-length integer.
pub const MAX_VARINT: u64 = (1 << 62) - 1;

/// The value would require more than 62 bits.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("value exceeds 62 bits")]
pub struct BoundsExceeded;

/// u64 is encoded as a QUIC variable-length integer (RFC 9000 §16).
///
/// The top two bits of the first byte select a 1, 2, 4 or 8 byte encoding;
/// the remaining bits are the value, big-endian.
impl Encode for u64 {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        let x = *self;
        if x < (1 << 6) {
            Self::encode_remaining(w, 1)?;
            w.put_u8(x as u8);
        } else if x < (1 << 14) {
            Self::encode_remaining(w, 2)?;
            w.put_u16((x as u16) | 0x4000);
        } else if x < (1 << 30) {
            Self::encode_remaining(w, 4)?;
            w.put_u32((x as u32) | 0x8000_0000);
        } else if x <= MAX_VARINT {
            Self::encode_remaining(w, 8)?;
            w.put_u64(x | 0xc000_0000_0000_0000);
        } else {
            return Err(BoundsExceeded.into());
        }

        Ok(())
    }
}

impl Decode for u64 {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Self::decode_remaining(r, 1)?;
        let first = r.get_u8();
        let extra = match first >> 6 {
            0b00 => 0,
            0b01 => 1,
            0b10 => 3,
            _ => 7,
        };
        Self::decode_remaining(r, extra)?;

        let mut value = (first & 0x3f) as u64;
        for _ in 0..extra {
            value = (value << 8) | r.get_u8() as u64;
        }

        Ok(value)
    }
}

/// usize fields (lengths) share the u64 varint encoding.
impl Encode for usize {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        let x = u64::try_from(*self).map_err(|_| BoundsExceeded)?;
        x.encode(w)
    }
}

impl Decode for usize {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let x = u64::decode(r)?;
        usize::try_from(x).map_err(|_| BoundsExceeded.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};

    #[test]
    fn encode_decode_widths() {
        // One expected encoding per varint width.
        for (value, bytes) in [
            (0u64, vec![0x00]),
            (63, vec![0x3f]),
            (64, vec![0x40, 0x40]),
            (1234, vec![0x44, 0xd2]),
            (16383, vec![0x7f, 0xff]),
            (16384, vec![0x80, 0x00, 0x40, 0x00]),
            (123456, vec![0x80, 0x01, 0xe2, 0x40]),
            (
                (1 << 30),
                vec![0xc0, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00],
            ),
            (
                MAX_VARINT,
                vec![0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
            ),
        ] {
            let mut buf = BytesMut::new();
            value.encode(&mut buf).unwrap();
            assert_eq!(buf.to_vec(), bytes, "encoding of {}", value);

            let decoded = u64::decode(&mut buf).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn encode_too_large() {
        let mut buf = BytesMut::new();
        let res = (MAX_VARINT + 1).encode(&mut buf);
        assert!(matches!(res.unwrap_err(), EncodeError::BoundsExceeded(_)));
    }

    #[test]
    fn decode_truncated() {
        // An 8-byte varint cut short.
        let mut buf: Bytes = vec![0xc0u8, 0x00, 0x00].into();
        let res = u64::decode(&mut buf);
        assert!(matches!(res.unwrap_err(), DecodeError::More(_)));
    }
}
