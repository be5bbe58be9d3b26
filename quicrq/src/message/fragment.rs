use bytes::Bytes;

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// A contiguous byte slice of one object, sent on a bidirectional stream.
///
/// The offset is encoded as `(offset << 1) | is_last_fragment`, so the
/// last-fragment marker rides with it. `nb_objects_previous_group` is only
/// meaningful on a group-opening fragment (object 0, offset 0) and must be
/// 0 everywhere else.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fragment {
    pub group_id: u64,
    pub object_id: u64,

    /// Number of objects in the previous group, declared by the fragment
    /// that opens a new group.
    pub nb_objects_previous_group: u64,

    /// Byte offset of this payload within the object.
    pub offset: u64,

    /// Whether this payload ends the object.
    pub is_last_fragment: bool,

    /// Reserved; carried untouched.
    pub flags: u8,

    pub payload: Bytes,
}

impl Decode for Fragment {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let group_id = u64::decode(r)?;
        let object_id = u64::decode(r)?;
        let nb_objects_previous_group = u64::decode(r)?;
        let offset_and_fin = u64::decode(r)?;
        let flags = u8::decode(r)?;
        let length = usize::decode(r)?;
        Self::decode_remaining(r, length)?;
        let payload = r.copy_to_bytes(length);

        Ok(Self {
            group_id,
            object_id,
            nb_objects_previous_group,
            offset: offset_and_fin >> 1,
            is_last_fragment: (offset_and_fin & 0x1) != 0,
            flags,
            payload,
        })
    }
}

impl Encode for Fragment {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.group_id.encode(w)?;
        self.object_id.encode(w)?;
        self.nb_objects_previous_group.encode(w)?;
        ((self.offset << 1) | (self.is_last_fragment as u64)).encode(w)?;
        self.flags.encode(w)?;
        self.payload.len().encode(w)?;
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

        let msg = Fragment {
            group_id: 0,
            object_id: 123456,
            nb_objects_previous_group: 0,
            offset: 1234,
            is_last_fragment: true,
            flags: 0x17,
            payload: Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]),
        };
        msg.encode(&mut buf).unwrap();

        // offset_and_fin = 1234 << 1 | 1 = 2469 = varint 0x49 0xa5
        let mut expected = vec![0x00, 0x80, 0x01, 0xe2, 0x40, 0x00, 0x49, 0xa5, 0x17, 0x0d];
        expected.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]);
        assert_eq!(buf.to_vec(), expected);

        let decoded = Fragment::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn encode_decode_group_opening() {
        let mut buf = BytesMut::new();

        let msg = Fragment {
            group_id: 11,
            object_id: 0,
            nb_objects_previous_group: 60,
            offset: 0,
            is_last_fragment: true,
            flags: 0x17,
            payload: Bytes::from_static(b"object"),
        };
        msg.encode(&mut buf).unwrap();
        let decoded = Fragment::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_length_overruns_buffer() {
        // Declares a 0xffff.. length with two bytes of varint missing its body.
        let mut buf: Bytes =
            vec![0x05u8, 0x0b, 0x00, 0x01, 0x17, 0x02, 0xff, 0xff].into();
        // Skip the message code; this test exercises the payload decode.
        let _ = u64::decode(&mut buf).unwrap();
        assert!(Fragment::decode(&mut buf).is_err());
    }
}
