use super::{Decode, DecodeError, Encode, EncodeError};

impl Encode for u8 {
    /// Encode a u8 to the given writer.
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        Self::encode_remaining(w, 1)?;
        w.put_u8(*self);
        Ok(())
    }
}

impl Decode for u8 {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Self::decode_remaining(r, 1)?;
        Ok(r.get_u8())
    }
}

impl Encode for bool {
    /// Encode a bool as u8 to the given writer.
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        Self::encode_remaining(w, 1)?;
        match *self {
            true => w.put_u8(1),
            false => w.put_u8(0),
        }
        Ok(())
    }
}

impl Decode for bool {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        match u8::decode(r)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};

    #[test]
    fn encode_decode_u8() {
        let mut buf = BytesMut::new();

        let i: u8 = 0x17;
        i.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x17]);
        let decoded = u8::decode(&mut buf).unwrap();
        assert_eq!(decoded, i);
    }

    #[test]
    fn decode_invalid_bool() {
        let data: Vec<u8> = vec![0x02];
        let mut buf: Bytes = data.into();
        let decoded = bool::decode(&mut buf);
        assert!(matches!(decoded.unwrap_err(), DecodeError::InvalidValue));
    }
}
