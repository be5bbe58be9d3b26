use crate::coding::{Decode, DecodeError, Encode, EncodeError, Url};
use crate::message::Intent;

/// Sent by a subscriber to fetch a media over the same bidirectional stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestStream {
    /// The name of the requested media.
    pub url: Url,

    /// Where in the media delivery should start.
    pub intent: Intent,
}

impl Decode for RequestStream {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let url = Url::decode(r)?;
        let intent = Intent::decode(r)?;

        Ok(Self { url, intent })
    }
}

impl Encode for RequestStream {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.url.encode(w)?;
        self.intent.encode(w)?;

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

        let msg = RequestStream {
            url: Url::from("example.com/media"),
            intent: Intent::CurrentGroup,
        };
        msg.encode(&mut buf).unwrap();

        let mut expected = vec![17u8];
        expected.extend_from_slice(b"example.com/media");
        expected.push(0x00);
        assert_eq!(buf.to_vec(), expected);

        let decoded = RequestStream::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn encode_decode_start_point() {
        let mut buf = BytesMut::new();

        let msg = RequestStream {
            url: Url::from("example.com/media"),
            intent: Intent::StartPoint {
                group_id: 4,
                object_id: 9,
            },
        };
        msg.encode(&mut buf).unwrap();
        let decoded = RequestStream::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }
}
