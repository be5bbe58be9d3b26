use crate::coding::{Decode, DecodeError, Encode, EncodeError, Url};

/// Asks the peer to report when a URL becomes available (see [super::Notify]).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subscribe {
    pub url: Url,
}

impl Decode for Subscribe {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let url = Url::decode(r)?;
        Ok(Self { url })
    }
}

impl Encode for Subscribe {
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

        let msg = Subscribe {
            url: Url::from("example.com/media"),
        };
        msg.encode(&mut buf).unwrap();

        let mut expected = vec![17u8];
        expected.extend_from_slice(b"example.com/media");
        assert_eq!(buf.to_vec(), expected);

        let decoded = Subscribe::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }
}
