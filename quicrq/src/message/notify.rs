use crate::coding::{Decode, DecodeError, Encode, EncodeError, Url};

/// Reports that a previously subscribed URL is now available.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notify {
    pub url: Url,
}

impl Decode for Notify {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let url = Url::decode(r)?;
        Ok(Self { url })
    }
}

impl Encode for Notify {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.url.encode(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn encode_decode() {
        let mut buf = BytesMut::new();

        let msg = Notify {
            url: Url::from("example.com/media"),
        };
        msg.encode(&mut buf).unwrap();
        let decoded = Notify::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }
}
