use crate::coding::Encode;

use super::SessionError;

/// Message framing over the send half of a stream.
pub struct Writer {
    stream: web_transport::SendStream,
    buffer: bytes::BytesMut,
}

impl Writer {
    pub fn new(stream: web_transport::SendStream) -> Self {
        Self {
            stream,
            buffer: Default::default(),
        }
    }

    pub async fn encode<T: Encode>(&mut self, msg: &T) -> Result<(), SessionError> {
        self.buffer.clear();
        msg.encode(&mut self.buffer)?;

        while !self.buffer.is_empty() {
            self.stream.write_buf(&mut self.buffer).await?;
        }

        Ok(())
    }
}
