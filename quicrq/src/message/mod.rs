//! Low-level control messages sent over the wire.
//!
//! Every bidirectional stream carries exactly one request-class message from
//! its initiator, one ACCEPT from the responder, and then data per the
//! negotiated transport mode. Datagram payloads use [crate::data::Datagram]
//! instead; this module is only the stream framing.

mod accept;
mod cache_policy;
mod fin_datagram;
mod fragment;
mod intent;
mod notify;
mod post;
mod request_datagram;
mod request_repair;
mod request_stream;
mod start_point;
mod subscribe;
mod transport_mode;

pub use accept::*;
pub use cache_policy::*;
pub use fin_datagram::*;
pub use fragment::*;
pub use intent::*;
pub use notify::*;
pub use post::*;
pub use request_datagram::*;
pub use request_repair::*;
pub use request_stream::*;
pub use start_point::*;
pub use subscribe::*;
pub use transport_mode::*;

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use std::fmt;

// Use a macro to generate the message types rather than copy-paste.
// This implements a decode/encode method that dispatches on the leading byte.
macro_rules! message_types {
    {$($name:ident = $val:expr,)*} => {
		/// All supported message types.
		#[derive(Clone, PartialEq, Eq)]
		pub enum Message {
			$($name($name)),*
		}

		impl Decode for Message {
			fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
				let t = u64::decode(r)?;

				match t {
					$($val => {
						let msg = $name::decode(r)?;
						Ok(Self::$name(msg))
					})*
					_ => Err(DecodeError::InvalidMessage(t)),
				}
			}
		}

		impl Encode for Message {
			fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
				self.id().encode(w)?;

				match self {
					$(Self::$name(ref m) => m.encode(w),)*
				}
			}
		}

		impl Message {
			pub fn id(&self) -> u64 {
				match self {
					$(Self::$name(_) => {
						$val
					},)*
				}
			}

			pub fn name(&self) -> &'static str {
				match self {
					$(Self::$name(_) => {
						stringify!($name)
					},)*
				}
			}
		}

		$(impl From<$name> for Message {
			fn from(m: $name) -> Self {
				Message::$name(m)
			}
		})*

		impl fmt::Debug for Message {
			// Delegate to the message formatter
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				match self {
					$(Self::$name(ref m) => m.fmt(f),)*
				}
			}
		}
    }
}

// Each message is identified by its leading byte.
message_types! {
    // Sent by a subscriber to open a subscription.
    RequestStream = 0x1,
    RequestDatagram = 0x2,

    // Sent by the publisher side of a subscription.
    FinDatagram = 0x3,
    Fragment = 0x5,
    StartPoint = 0x8,

    // Sent by a datagram-mode subscriber to recover losses.
    RequestRepair = 0x4,

    // Sent by a publisher to push a media.
    Post = 0x6,
    CachePolicy = 0xb,

    // Sent by the responder of any request.
    Accept = 0x7,

    // Availability signalling, either direction.
    Subscribe = 0x9,
    Notify = 0xa,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::Url;
    use bytes::{Bytes, BytesMut};
    use std::io;

    const URL: &[u8] = b"example.com/media";
    const PAYLOAD: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13];

    fn url() -> Url {
        Url::from("example.com/media")
    }

    fn url_bytes() -> Vec<u8> {
        let mut bytes = vec![URL.len() as u8];
        bytes.extend_from_slice(URL);
        bytes
    }

    // Every message kind with its exact wire encoding.
    fn wire_cases() -> Vec<(Message, Vec<u8>)> {
        let mut cases: Vec<(Message, Vec<u8>)> = Vec::new();

        let mut bytes = vec![0x01];
        bytes.extend(url_bytes());
        bytes.push(0x00);
        cases.push((
            RequestStream {
                url: url(),
                intent: Intent::CurrentGroup,
            }
            .into(),
            bytes,
        ));

        let mut bytes = vec![0x02];
        bytes.extend(url_bytes());
        bytes.extend_from_slice(&[0x00, 0x44, 0xd2]);
        cases.push((
            RequestDatagram {
                url: url(),
                intent: Intent::CurrentGroup,
                media_id: 1234,
            }
            .into(),
            bytes,
        ));

        let mut bytes = vec![0x02];
        bytes.extend(url_bytes());
        bytes.extend_from_slice(&[0x01, 0x44, 0xd2]);
        cases.push((
            RequestDatagram {
                url: url(),
                intent: Intent::NextGroup,
                media_id: 1234,
            }
            .into(),
            bytes,
        ));

        let mut bytes = vec![0x02];
        bytes.extend(url_bytes());
        bytes.extend_from_slice(&[0x02, 0x04, 0x09, 0x44, 0xd2]);
        cases.push((
            RequestDatagram {
                url: url(),
                intent: Intent::StartPoint {
                    group_id: 4,
                    object_id: 9,
                },
                media_id: 1234,
            }
            .into(),
            bytes,
        ));

        cases.push((
            FinDatagram {
                media_id: 17,
                final_group_id: 17,
                final_object_id: 123456,
            }
            .into(),
            vec![0x03, 0x11, 0x11, 0x80, 0x01, 0xe2, 0x40],
        ));

        cases.push((
            RequestRepair {
                group_id: 0,
                object_id: 123456,
                offset: 1234,
                length: 13,
                is_last_fragment: true,
            }
            .into(),
            vec![0x04, 0x00, 0x80, 0x01, 0xe2, 0x40, 0x44, 0xd2, 0x0d, 0x01],
        ));

        let mut bytes = vec![0x05, 0x00, 0x80, 0x01, 0xe2, 0x40, 0x00, 0x49, 0xa5, 0x17, 0x0d];
        bytes.extend_from_slice(PAYLOAD);
        cases.push((
            Fragment {
                group_id: 0,
                object_id: 123456,
                nb_objects_previous_group: 0,
                offset: 1234,
                is_last_fragment: true,
                flags: 0x17,
                payload: Bytes::from_static(PAYLOAD),
            }
            .into(),
            bytes,
        ));

        let mut bytes = vec![0x05, 0x0b, 0x00, 0x3c, 0x01, 0x17, 0x0d];
        bytes.extend_from_slice(PAYLOAD);
        cases.push((
            Fragment {
                group_id: 11,
                object_id: 0,
                nb_objects_previous_group: 60,
                offset: 0,
                is_last_fragment: true,
                flags: 0x17,
                payload: Bytes::from_static(PAYLOAD),
            }
            .into(),
            bytes,
        ));

        let mut bytes = vec![0x06];
        bytes.extend(url_bytes());
        bytes.extend_from_slice(&[0x01, 0x00, 0x01, 0x0c]);
        cases.push((
            Post {
                url: url(),
                transport_mode: TransportMode::SingleStream,
                intent: Intent::CurrentGroup,
                group_id: 1,
                object_id: 12,
            }
            .into(),
            bytes,
        ));

        cases.push((
            Accept {
                transport_mode: TransportMode::SingleStream,
                media_id: None,
            }
            .into(),
            vec![0x07, 0x01],
        ));

        cases.push((
            Accept {
                transport_mode: TransportMode::Datagram,
                media_id: Some(17),
            }
            .into(),
            vec![0x07, 0x02, 0x11],
        ));

        cases.push((
            StartPoint {
                group_id: 2469,
                object_id: 123456,
            }
            .into(),
            vec![0x08, 0x49, 0xa5, 0x80, 0x01, 0xe2, 0x40],
        ));

        let mut bytes = vec![0x09];
        bytes.extend(url_bytes());
        cases.push((Subscribe { url: url() }.into(), bytes));

        let mut bytes = vec![0x0a];
        bytes.extend(url_bytes());
        cases.push((Notify { url: url() }.into(), bytes));

        cases.push((
            CachePolicy {
                policy: EvictionPolicy::Drop,
            }
            .into(),
            vec![0x0b, 0x01],
        ));

        cases
    }

    #[test]
    fn round_trip() {
        for (msg, bytes) in wire_cases() {
            let mut buf = BytesMut::new();
            msg.encode(&mut buf).unwrap();
            assert_eq!(buf.to_vec(), bytes, "encoding of {}", msg.name());

            let mut cursor = io::Cursor::new(&bytes);
            let decoded = Message::decode(&mut cursor).unwrap();
            assert_eq!(decoded, msg, "decoding of {}", msg.name());
            assert_eq!(
                cursor.position() as usize,
                bytes.len(),
                "consumed length of {}",
                msg.name()
            );
        }
    }

    #[test]
    fn truncations_fail() {
        for (msg, bytes) in wire_cases() {
            for len in 0..bytes.len() {
                let mut cursor = io::Cursor::new(&bytes[..len]);
                assert!(
                    Message::decode(&mut cursor).is_err(),
                    "{} truncated to {} bytes decoded",
                    msg.name(),
                    len
                );
            }
        }
    }

    // The hand-crafted malformed sequences: wrong varint widths, length
    // fields overrunning the buffer, invalid intent tags and modes, and
    // missing trailing fields.
    fn bad_cases() -> Vec<Vec<u8>> {
        let huge = [0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        let mut cases = Vec::new();

        // Unknown message type.
        let mut bytes = huge.to_vec();
        bytes.extend(url_bytes());
        bytes.push(0x00);
        cases.push(bytes);

        // REQUEST_STREAM with oversized / overrunning url lengths.
        let mut bytes = vec![0x01];
        bytes.extend_from_slice(&huge);
        bytes.extend_from_slice(URL);
        bytes.push(0x00);
        cases.push(bytes);

        let mut bytes = vec![0x01, 0x8f, 0xff, 0xff, 0xff];
        bytes.extend_from_slice(URL);
        bytes.push(0x00);
        cases.push(bytes);

        let mut bytes = vec![0x01, 0x4f, 0xff];
        bytes.extend_from_slice(URL);
        bytes.push(0x00);
        cases.push(bytes);

        let mut bytes = vec![0x01, URL.len() as u8 + 1];
        bytes.extend_from_slice(URL);
        bytes.push(0x00);
        cases.push(bytes);

        // REQUEST_DATAGRAM with the same length corruptions.
        let mut bytes = vec![0x02];
        bytes.extend_from_slice(&huge);
        bytes.extend_from_slice(URL);
        bytes.extend_from_slice(&[0x00, 0x44, 0xd2]);
        cases.push(bytes);

        let mut bytes = vec![0x02, 0x8f, 0xff, 0xff, 0xff];
        bytes.extend_from_slice(URL);
        bytes.extend_from_slice(&[0x00, 0x44, 0xd2]);
        cases.push(bytes);

        let mut bytes = vec![0x02, 0x4f, 0xff];
        bytes.extend_from_slice(URL);
        bytes.extend_from_slice(&[0x44, 0xd2]);
        cases.push(bytes);

        let mut bytes = vec![0x02, URL.len() as u8 + 1];
        bytes.extend_from_slice(URL);
        bytes.extend_from_slice(&[0x44, 0xd2]);
        cases.push(bytes);

        // POST with an invalid transport mode.
        let mut bytes = vec![0x06];
        bytes.extend(url_bytes());
        bytes.push(0x11);
        cases.push(bytes);

        // POST with an overrunning url length.
        let mut bytes = vec![0x06, 0x4f, 0xff];
        bytes.extend_from_slice(URL);
        bytes.extend_from_slice(&[0x11, 0x01, 0x0c]);
        cases.push(bytes);

        // ACCEPT with an invalid mode / missing media id.
        cases.push(vec![0x07, 0x11, 0x11]);
        cases.push(vec![0x07, 0x02]);

        // START_POINT whose first varint claims 8 bytes.
        cases.push(vec![0x08, 0xff, 0xa5, 0x80, 0x01, 0xe2, 0x40]);

        // FRAGMENT whose length varint claims 8 bytes.
        cases.push(vec![0x05, 0x0b, 0x00, 0x01, 0x17, 0x02, 0xff, 0xff]);

        // REQUEST_DATAGRAM intent corruptions.
        let mut bytes = vec![0x02];
        bytes.extend(url_bytes());
        bytes.extend_from_slice(&[0x44, 0xd2]);
        cases.push(bytes);

        let mut bytes = vec![0x02];
        bytes.extend(url_bytes());
        bytes.extend_from_slice(&[0x02, 0x44, 0xd2]);
        cases.push(bytes);

        let mut bytes = vec![0x02];
        bytes.extend(url_bytes());
        bytes.extend_from_slice(&[0x02, 0x04, 0x44, 0xd2]);
        cases.push(bytes);

        let mut bytes = vec![0x02];
        bytes.extend(url_bytes());
        bytes.extend_from_slice(&[0x03, 0x44, 0xd2]);
        cases.push(bytes);

        // REQUEST_STREAM with a missing / invalid intent.
        let mut bytes = vec![0x01];
        bytes.extend(url_bytes());
        cases.push(bytes);

        let mut bytes = vec![0x01];
        bytes.extend(url_bytes());
        bytes.push(0x03);
        cases.push(bytes);

        cases
    }

    #[test]
    fn bad_bytes_fail() {
        let cases = bad_cases();
        assert_eq!(cases.len(), 21);

        for (i, bytes) in cases.iter().enumerate() {
            let mut cursor = io::Cursor::new(bytes);
            assert!(
                Message::decode(&mut cursor).is_err(),
                "bad case {} decoded",
                i + 1
            );
        }
    }
}
