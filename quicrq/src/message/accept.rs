use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::message::TransportMode;

/// Sent by the responder to accept a request or a post.
///
/// A datagram-mode accept carries the media id the datagrams will use: the
/// echo of the subscriber's choice for a request, or the responder's
/// allocation for a post.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Accept {
    pub transport_mode: TransportMode,
    pub media_id: Option<u64>,
}

impl Decode for Accept {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let transport_mode = TransportMode::decode(r)?;
        let media_id = match transport_mode {
            TransportMode::Datagram => Some(u64::decode(r)?),
            TransportMode::SingleStream => None,
        };

        Ok(Self {
            transport_mode,
            media_id,
        })
    }
}

impl Encode for Accept {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.transport_mode.encode(w)?;
        match self.transport_mode {
            TransportMode::Datagram => match self.media_id {
                Some(media_id) => media_id.encode(w)?,
                None => return Err(EncodeError::MissingField("MediaId".to_string())),
            },
            TransportMode::SingleStream => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};

    #[test]
    fn encode_decode() {
        let mut buf = BytesMut::new();

        let msg = Accept {
            transport_mode: TransportMode::SingleStream,
            media_id: None,
        };
        msg.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x01]);
        assert_eq!(Accept::decode(&mut buf).unwrap(), msg);

        let msg = Accept {
            transport_mode: TransportMode::Datagram,
            media_id: Some(17),
        };
        msg.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x02, 0x11]);
        assert_eq!(Accept::decode(&mut buf).unwrap(), msg);
    }

    #[test]
    fn encode_missing_media_id() {
        let mut buf = BytesMut::new();

        let msg = Accept {
            transport_mode: TransportMode::Datagram,
            media_id: None,
        };
        let res = msg.encode(&mut buf);
        assert!(matches!(res.unwrap_err(), EncodeError::MissingField(_)));
    }

    #[test]
    fn decode_truncated_media_id() {
        let mut buf: Bytes = vec![0x02u8].into();
        let res = Accept::decode(&mut buf);
        assert!(matches!(res.unwrap_err(), DecodeError::More(_)));
    }
}
