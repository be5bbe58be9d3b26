use std::fmt;

use bytes::Bytes;

use super::{Decode, DecodeError, Encode, EncodeError};

/// The name of a media: an opaque byte string compared byte-for-byte.
///
/// URLs are length-prefixed on the wire with a varint. They usually look
/// like `example.com/media` but nothing in the protocol requires UTF-8.
#[derive(Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Url(Bytes);

impl Url {
    pub const MAX_LEN: usize = 65_535;

    pub fn new<B: Into<Bytes>>(bytes: B) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Url {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Url({})", self)
    }
}

impl Encode for Url {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        if self.0.len() > Self::MAX_LEN {
            return Err(EncodeError::FieldBoundsExceeded("Url".to_string()));
        }
        self.0.len().encode(w)?;
        Self::encode_remaining(w, self.0.len())?;
        w.put_slice(&self.0);
        Ok(())
    }
}

impl Decode for Url {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let size = usize::decode(r)?;
        if size > Self::MAX_LEN {
            return Err(DecodeError::FieldBoundsExceeded("Url".to_string()));
        }
        Self::decode_remaining(r, size)?;
        Ok(Self(r.copy_to_bytes(size)))
    }
}
