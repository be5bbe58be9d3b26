use crate::coding::{Decode, DecodeError, Encode, EncodeError, Url};
use crate::message::Intent;

/// Sent by a subscriber to fetch a media as QUIC datagrams.
///
/// The subscriber picks the media id; incoming datagrams carry it so they
/// can be demultiplexed without consulting URL state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestDatagram {
    /// The name of the requested media.
    pub url: Url,

    /// Where in the media delivery should start.
    pub intent: Intent,

    /// The per-connection identifier for this subscription's datagrams.
    pub media_id: u64,
}

impl Decode for RequestDatagram {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let url = Url::decode(r)?;
        let intent = Intent::decode(r)?;
        let media_id = u64::decode(r)?;

        Ok(Self {
            url,
            intent,
            media_id,
        })
    }
}

impl Encode for RequestDatagram {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.url.encode(w)?;
        self.intent.encode(w)?;
        self.media_id.encode(w)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn url_bytes() -> Vec<u8> {
        let mut bytes = vec![17u8];
        bytes.extend_from_slice(b"example.com/media");
        bytes
    }

    #[test]
    fn encode_decode() {
        let mut buf = BytesMut::new();

        let msg = RequestDatagram {
            url: Url::from("example.com/media"),
            intent: Intent::NextGroup,
            media_id: 1234,
        };
        msg.encode(&mut buf).unwrap();

        let mut expected = url_bytes();
        expected.extend_from_slice(&[0x01, 0x44, 0xd2]);
        assert_eq!(buf.to_vec(), expected);

        let decoded = RequestDatagram::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn encode_decode_start_point() {
        let mut buf = BytesMut::new();

        let msg = RequestDatagram {
            url: Url::from("example.com/media"),
            intent: Intent::StartPoint {
                group_id: 4,
                object_id: 9,
            },
            media_id: 1234,
        };
        msg.encode(&mut buf).unwrap();

        let mut expected = url_bytes();
        expected.extend_from_slice(&[0x02, 0x04, 0x09, 0x44, 0xd2]);
        assert_eq!(buf.to_vec(), expected);

        let decoded = RequestDatagram::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }
}
