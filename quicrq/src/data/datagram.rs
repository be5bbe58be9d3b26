use bytes::Bytes;

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// One fragment carried in one QUIC datagram.
///
/// The leading media id lets the receiver demultiplex without consulting any
/// URL state. The payload runs to the end of the datagram, so no length
/// field is needed. `nb_objects_previous_group` is only present on a
/// group-opening fragment (object 0, offset 0), which is the one place the
/// group boundary can be declared.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Datagram {
    pub media_id: u64,
    pub group_id: u64,
    pub object_id: u64,

    /// Byte offset of this payload within the object.
    pub offset: u64,

    /// Whether this payload ends the object.
    pub is_last_fragment: bool,

    /// Microseconds the fragment waited at the sender before transmission.
    pub queue_delay: u64,

    /// Reserved; carried untouched.
    pub flags: u8,

    /// Objects in the previous group; only encoded on a group-opening
    /// fragment.
    pub nb_objects_previous_group: u64,

    pub payload: Bytes,
}

impl Datagram {
    fn opens_group(&self) -> bool {
        self.object_id == 0 && self.offset == 0
    }
}

impl Decode for Datagram {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let media_id = u64::decode(r)?;
        let group_id = u64::decode(r)?;
        let object_id = u64::decode(r)?;
        let offset_and_fin = u64::decode(r)?;
        let queue_delay = u64::decode(r)?;
        let flags = u8::decode(r)?;

        let offset = offset_and_fin >> 1;
        let nb_objects_previous_group = match object_id == 0 && offset == 0 {
            true => u64::decode(r)?,
            false => 0,
        };

        let payload = r.copy_to_bytes(r.remaining());

        Ok(Self {
            media_id,
            group_id,
            object_id,
            offset,
            is_last_fragment: (offset_and_fin & 0x1) != 0,
            queue_delay,
            flags,
            nb_objects_previous_group,
            payload,
        })
    }
}

impl Encode for Datagram {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.media_id.encode(w)?;
        self.group_id.encode(w)?;
        self.object_id.encode(w)?;
        ((self.offset << 1) | (self.is_last_fragment as u64)).encode(w)?;
        self.queue_delay.encode(w)?;
        self.flags.encode(w)?;
        if self.opens_group() {
            self.nb_objects_previous_group.encode(w)?;
        }
        Self::encode_remaining(w, self.payload.len())?;
        w.put_slice(&self.payload);

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

        let datagram = Datagram {
            media_id: 17,
            group_id: 3,
            object_id: 12,
            offset: 1234,
            is_last_fragment: false,
            queue_delay: 250,
            flags: 0,
            nb_objects_previous_group: 0,
            payload: Bytes::from_static(b"payload"),
        };
        datagram.encode(&mut buf).unwrap();
        // MediaId(1) + Group(1) + Object(1) + OffsetFin(2) + Delay(2) + Flags(1) + Payload(7)
        assert_eq!(buf.len(), 15);

        let decoded = Datagram::decode(&mut buf).unwrap();
        assert_eq!(decoded, datagram);
    }

    #[test]
    fn encode_decode_group_opening() {
        let mut buf = BytesMut::new();

        let datagram = Datagram {
            media_id: 17,
            group_id: 4,
            object_id: 0,
            offset: 0,
            is_last_fragment: true,
            queue_delay: 0,
            flags: 0,
            nb_objects_previous_group: 60,
            payload: Bytes::from_static(b"payload"),
        };
        datagram.encode(&mut buf).unwrap();
        // One extra byte for the group count.
        assert_eq!(buf.len(), 13);

        let decoded = Datagram::decode(&mut buf).unwrap();
        assert_eq!(decoded, datagram);
    }

    #[test]
    fn decode_truncated() {
        let mut buf = BytesMut::new();
        Datagram {
            media_id: 17,
            group_id: 3,
            object_id: 12,
            offset: 0,
            is_last_fragment: false,
            queue_delay: 0,
            flags: 0,
            nb_objects_previous_group: 0,
            payload: Bytes::new(),
        }
        .encode(&mut buf)
        .unwrap();

        // Cut the header short of the flags byte.
        let mut short = buf.split_to(4);
        assert!(Datagram::decode(&mut short).is_err());
    }
}
