use crate::coding::{Decode, DecodeError, Encode, EncodeError, Url};
use crate::message::{Intent, TransportMode};

/// Sent by a publisher to push a media to the peer.
///
/// (group_id, object_id) is the point at which the pushed data begins,
/// so a relay re-publishing mid-stream does not pretend to own history it
/// never saw.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Post {
    pub url: Url,
    pub transport_mode: TransportMode,
    pub intent: Intent,
    pub group_id: u64,
    pub object_id: u64,
}

impl Decode for Post {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let url = Url::decode(r)?;
        let transport_mode = TransportMode::decode(r)?;
        let intent = Intent::decode(r)?;
        let group_id = u64::decode(r)?;
        let object_id = u64::decode(r)?;

        Ok(Self {
            url,
            transport_mode,
            intent,
            group_id,
            object_id,
        })
    }
}

impl Encode for Post {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.url.encode(w)?;
        self.transport_mode.encode(w)?;
        self.intent.encode(w)?;
        self.group_id.encode(w)?;
        self.object_id.encode(w)?;

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

        let msg = Post {
            url: Url::from("example.com/media"),
            transport_mode: TransportMode::SingleStream,
            intent: Intent::CurrentGroup,
            group_id: 1,
            object_id: 12,
        };
        msg.encode(&mut buf).unwrap();

        let mut expected = vec![17u8];
        expected.extend_from_slice(b"example.com/media");
        expected.extend_from_slice(&[0x01, 0x00, 0x01, 0x0c]);
        assert_eq!(buf.to_vec(), expected);

        let decoded = Post::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }
}
