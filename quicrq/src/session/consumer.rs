use crate::message::EvictionPolicy;
use crate::reassembly::{ObjectSink, ReassemblyBuffer};
use crate::serve::{CacheWriter, CachedFragment, Publication, ServeError};

/// Returned by consumer callbacks to keep or end the subscription.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConsumerStatus {
    Active,

    /// The media is fully delivered; terminate the subscription cleanly.
    Finished,
}

/// The receiving end of a subscription, fed fragment by fragment.
///
/// Any other error than [ServeError] variants mapping to protocol codes
/// terminates the subscription with a protocol error.
pub trait Consumer: Send + 'static {
    fn fragment(&mut self, now: u64, fragment: CachedFragment)
        -> Result<ConsumerStatus, ServeError>;

    fn final_object(&mut self, group_id: u64, object_id: u64)
        -> Result<ConsumerStatus, ServeError>;

    fn start_point(
        &mut self,
        now: u64,
        group_id: u64,
        object_id: u64,
    ) -> Result<ConsumerStatus, ServeError>;

    /// The publisher declared the media's eviction policy.
    fn cache_policy(&mut self, _policy: EvictionPolicy) -> Result<ConsumerStatus, ServeError> {
        Ok(ConsumerStatus::Active)
    }

    fn close(&mut self) {}
}

/// Reassembles incoming fragments and hands whole objects to a sink, in
/// canonical order.
pub struct ObjectConsumer<S: ObjectSink + Send + 'static> {
    buffer: ReassemblyBuffer,
    sink: S,
}

impl<S: ObjectSink + Send + 'static> ObjectConsumer<S> {
    pub fn new(sink: S) -> Self {
        Self {
            buffer: ReassemblyBuffer::new(),
            sink,
        }
    }

    fn status(&self) -> ConsumerStatus {
        match self.buffer.is_finished() {
            true => ConsumerStatus::Finished,
            false => ConsumerStatus::Active,
        }
    }
}

impl<S: ObjectSink + Send + 'static> Consumer for ObjectConsumer<S> {
    fn fragment(
        &mut self,
        now: u64,
        fragment: CachedFragment,
    ) -> Result<ConsumerStatus, ServeError> {
        self.buffer.input(
            now,
            fragment.group_id,
            fragment.object_id,
            fragment.offset,
            fragment.flags,
            fragment.nb_objects_previous_group,
            fragment.is_last_fragment,
            fragment.payload,
            &mut self.sink,
        )?;
        Ok(self.status())
    }

    fn final_object(
        &mut self,
        group_id: u64,
        object_id: u64,
    ) -> Result<ConsumerStatus, ServeError> {
        self.buffer.learn_final_object_id(group_id, object_id)?;
        Ok(self.status())
    }

    fn start_point(
        &mut self,
        now: u64,
        group_id: u64,
        object_id: u64,
    ) -> Result<ConsumerStatus, ServeError> {
        self.buffer
            .learn_start_point(group_id, object_id, now, &mut self.sink)?;
        Ok(self.status())
    }
}

/// Bridges a subscription into a local cache entry: the relay ingest path.
///
/// Holds the publication guard so the bridged URL stays routable for as
/// long as the upstream subscription lives.
pub struct CacheBridge {
    writer: CacheWriter,
    _publication: Option<Publication>,
}

impl CacheBridge {
    pub fn new(writer: CacheWriter, publication: Option<Publication>) -> Self {
        Self {
            writer,
            _publication: publication,
        }
    }
}

impl CacheBridge {
    fn status(&self) -> ConsumerStatus {
        match self.writer.is_complete() {
            true => ConsumerStatus::Finished,
            false => ConsumerStatus::Active,
        }
    }
}

impl Consumer for CacheBridge {
    fn fragment(
        &mut self,
        _now: u64,
        fragment: CachedFragment,
    ) -> Result<ConsumerStatus, ServeError> {
        self.writer.insert(fragment)?;
        Ok(self.status())
    }

    fn final_object(
        &mut self,
        group_id: u64,
        object_id: u64,
    ) -> Result<ConsumerStatus, ServeError> {
        self.writer.set_final(group_id, object_id)?;
        Ok(self.status())
    }

    fn start_point(
        &mut self,
        _now: u64,
        group_id: u64,
        object_id: u64,
    ) -> Result<ConsumerStatus, ServeError> {
        self.writer.set_start(group_id, object_id)?;
        Ok(ConsumerStatus::Active)
    }

    fn cache_policy(&mut self, policy: EvictionPolicy) -> Result<ConsumerStatus, ServeError> {
        self.writer.set_policy(policy)?;
        Ok(ConsumerStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reassembly::ObjectMode;
    use bytes::Bytes;

    fn fragment(object_id: u64, offset: u64, is_last: bool, payload: &'static [u8]) -> CachedFragment {
        CachedFragment {
            group_id: 0,
            object_id,
            offset,
            is_last_fragment: is_last,
            nb_objects_previous_group: 0,
            queue_delay: 0,
            flags: 0,
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn object_consumer_reassembles() {
        use std::sync::{Arc, Mutex};

        let objects: Arc<Mutex<Vec<(u64, Vec<u8>)>>> = Default::default();
        let delivered = objects.clone();
        let sink = move |_now: u64,
                         _group: u64,
                         object_id: u64,
                         _flags: u8,
                         payload: &[u8],
                         mode: ObjectMode|
              -> Result<(), ServeError> {
            assert_eq!(mode, ObjectMode::InSequence);
            delivered.lock().unwrap().push((object_id, payload.to_vec()));
            Ok(())
        };

        let mut consumer = ObjectConsumer::new(sink);

        // Out of order within the object; in order across objects.
        assert_eq!(
            consumer.fragment(0, fragment(0, 2, true, b"bb")).unwrap(),
            ConsumerStatus::Active
        );
        assert_eq!(
            consumer.fragment(0, fragment(0, 0, false, b"aa")).unwrap(),
            ConsumerStatus::Active
        );
        assert_eq!(
            consumer.fragment(0, fragment(1, 0, true, b"cc")).unwrap(),
            ConsumerStatus::Active
        );

        // The final report drains the subscription.
        assert_eq!(
            consumer.final_object(0, 2).unwrap(),
            ConsumerStatus::Finished
        );

        let objects = objects.lock().unwrap();
        assert_eq!(
            *objects,
            vec![(0, b"aabb".to_vec()), (1, b"cc".to_vec())]
        );
    }
}
