use std::io;

use bytes::{Buf, BytesMut};

use crate::coding::{Decode, DecodeError};

use super::SessionError;

/// Buffered message framing over the receive half of a stream.
pub struct Reader {
    stream: web_transport::RecvStream,
    buffer: BytesMut,
}

impl Reader {
    pub fn new(stream: web_transport::RecvStream) -> Self {
        Self {
            stream,
            buffer: Default::default(),
        }
    }

    pub async fn decode<T: Decode>(&mut self) -> Result<T, SessionError> {
        loop {
            let mut cursor = io::Cursor::new(&self.buffer);

            // Try to decode with the current buffer.
            let required = match T::decode(&mut cursor) {
                Ok(msg) => {
                    self.buffer.advance(cursor.position() as usize);
                    return Ok(msg);
                }
                Err(DecodeError::More(required)) => self.buffer.len() + required,
                Err(err) => {
                    log::debug!(
                        "failed to decode {}: {:?}",
                        std::any::type_name::<T>(),
                        err
                    );
                    return Err(err.into());
                }
            };

            // Read in more data until we reach the requested amount.
            // We always read at least once to avoid an infinite loop if some dingus puts remain=0
            loop {
                if !self.stream.read_buf(&mut self.buffer).await? {
                    // The stream ended mid-message.
                    return Err(DecodeError::More(required - self.buffer.len()).into());
                };

                if self.buffer.len() >= required {
                    break;
                }
            }
        }
    }

    /// True once the stream has cleanly ended with no buffered bytes left.
    pub async fn finished(&mut self) -> Result<bool, SessionError> {
        if !self.buffer.is_empty() {
            return Ok(false);
        }

        Ok(!self.stream.read_buf(&mut self.buffer).await?)
    }
}
