//! Reorders fragments into whole objects, delivered in canonical order.
//!
//! Each subscription owns one [ReassemblyBuffer]. Fragments go in through
//! [ReassemblyBuffer::input] in whatever order the network produced them;
//! completed objects come out through an [ObjectSink], every object exactly
//! once in (group, object) order. An object that completes ahead of a hole
//! is surfaced early in [ObjectMode::Peek] and surfaced again as
//! [ObjectMode::Repair] once the hole fills, so a consumer can both monitor
//! progress and still write bytes strictly in order.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::serve::ServeError;

/// How an object reached the sink.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObjectMode {
    /// First delivery, in canonical order.
    InSequence,

    /// Early delivery of an object that completed ahead of a hole. It will
    /// be delivered again once its turn comes.
    Peek,

    /// In-order re-delivery of a previously peeked object.
    Repair,
}

/// Receives completed objects from a [ReassemblyBuffer].
pub trait ObjectSink {
    fn object(
        &mut self,
        now: u64,
        group_id: u64,
        object_id: u64,
        flags: u8,
        payload: &[u8],
        mode: ObjectMode,
    ) -> Result<(), ServeError>;
}

impl<F> ObjectSink for F
where
    F: FnMut(u64, u64, u64, u8, &[u8], ObjectMode) -> Result<(), ServeError>,
{
    fn object(
        &mut self,
        now: u64,
        group_id: u64,
        object_id: u64,
        flags: u8,
        payload: &[u8],
        mode: ObjectMode,
    ) -> Result<(), ServeError> {
        self(now, group_id, object_id, flags, payload, mode)
    }
}

#[derive(Default)]
struct ObjectBuffer {
    // Disjoint received ranges, keyed by offset.
    chunks: BTreeMap<u64, Bytes>,
    declared_len: Option<u64>,
    received: u64,
    flags: u8,
    peeked: bool,
}

impl ObjectBuffer {
    /// Merge a fragment. Returns false when it was an exact duplicate.
    fn insert(&mut self, offset: u64, payload: Bytes, is_last: bool) -> Result<bool, ServeError> {
        let len = payload.len() as u64;

        if is_last {
            let end = offset + len;
            match self.declared_len {
                Some(declared) if declared != end => return Err(ServeError::Overlap),
                _ => self.declared_len = Some(end),
            }
        }

        if let Some(declared) = self.declared_len {
            if offset + len > declared {
                return Err(ServeError::Overlap);
            }
        }

        if len == 0 {
            return Ok(is_last);
        }

        // Ranges must coincide exactly or be disjoint.
        if let Some((&prev_offset, prev)) = self.chunks.range(..=offset).next_back() {
            if prev_offset + prev.len() as u64 > offset {
                if prev_offset == offset && prev.len() as u64 == len && *prev == payload {
                    return Ok(false);
                }
                return Err(ServeError::Overlap);
            }
        }
        if let Some((&next_offset, _)) = self.chunks.range(offset + 1..).next() {
            if offset + len > next_offset {
                return Err(ServeError::Overlap);
            }
        }

        self.chunks.insert(offset, payload);
        self.received += len;

        Ok(true)
    }

    fn is_complete(&self) -> bool {
        // Ranges are disjoint and bounded by the declared length, so matching
        // byte counts means the object is fully tiled.
        self.declared_len == Some(self.received)
    }

    fn assemble(&self) -> Bytes {
        let mut data = Vec::with_capacity(self.received as usize);
        for chunk in self.chunks.values() {
            data.extend_from_slice(chunk);
        }
        Bytes::from(data)
    }
}

#[derive(Default)]
struct GroupBuffer {
    objects: BTreeMap<u64, ObjectBuffer>,

    // Number of objects in this group, declared by the next group's opening
    // fragment (or the final object report for the last group).
    nb_objects: Option<u64>,
}

/// Per-subscription reassembly state.
#[derive(Default)]
pub struct ReassemblyBuffer {
    groups: BTreeMap<u64, GroupBuffer>,

    // The next (group, object) owed to the sink.
    next_group: u64,
    next_object: u64,

    // One past the last object of the media, once learned.
    final_point: Option<(u64, u64)>,

    started: bool,
    finished: bool,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once every object up to the learned final point was delivered.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The next (group, object) not yet delivered in sequence.
    pub fn next_point(&self) -> (u64, u64) {
        (self.next_group, self.next_object)
    }

    /// Merge one fragment, surfacing any objects it completes.
    #[allow(clippy::too_many_arguments)]
    pub fn input<S: ObjectSink>(
        &mut self,
        now: u64,
        group_id: u64,
        object_id: u64,
        offset: u64,
        flags: u8,
        nb_objects_previous_group: u64,
        is_last_fragment: bool,
        payload: Bytes,
        sink: &mut S,
    ) -> Result<(), ServeError> {
        if self.finished {
            return Ok(());
        }

        // A group-opening fragment closes the previous group.
        if group_id > 0 && object_id == 0 && offset == 0 && nb_objects_previous_group > 0 {
            self.declare_group_size(group_id - 1, nb_objects_previous_group)?;
        }

        // Duplicates of already delivered objects are non-events.
        if (group_id, object_id) >= (self.next_group, self.next_object) {
            let object = self
                .groups
                .entry(group_id)
                .or_default()
                .objects
                .entry(object_id)
                .or_default();

            object.flags = flags;
            object.insert(offset, payload, is_last_fragment)?;
        }

        // The fragment (or the group size it declared) may unblock delivery.
        self.flush(now, sink)?;

        // Surface an object that completed ahead of a hole.
        if let Some(group) = self.groups.get_mut(&group_id) {
            if let Some(object) = group.objects.get_mut(&object_id) {
                if object.is_complete() && !object.peeked {
                    object.peeked = true;
                    let data = object.assemble();
                    sink.object(now, group_id, object_id, flags, &data, ObjectMode::Peek)?;
                }
            }
        }

        self.check_finished();
        Ok(())
    }

    /// Record that the media ends just before (group_id, object_id).
    pub fn learn_final_object_id(
        &mut self,
        group_id: u64,
        object_id: u64,
    ) -> Result<(), ServeError> {
        match self.final_point {
            Some(point) if point != (group_id, object_id) => return Err(ServeError::Overlap),
            _ => self.final_point = Some((group_id, object_id)),
        }

        // The final group's size is now known too.
        self.declare_group_size(group_id, object_id)?;
        self.check_finished();

        Ok(())
    }

    /// Record that delivery starts at (group_id, object_id): everything
    /// before it is a non-event, not a hole. Ignored once delivery began.
    pub fn learn_start_point<S: ObjectSink>(
        &mut self,
        group_id: u64,
        object_id: u64,
        now: u64,
        sink: &mut S,
    ) -> Result<(), ServeError> {
        if self.started || (group_id, object_id) <= (self.next_group, self.next_object) {
            return Ok(());
        }

        self.next_group = group_id;
        self.next_object = object_id;

        // Discard anything buffered before the start.
        self.groups.retain(|&g, _| g >= group_id);
        if let Some(group) = self.groups.get_mut(&group_id) {
            group.objects.retain(|&o, _| o >= object_id);
        }

        self.flush(now, sink)?;
        self.check_finished();

        Ok(())
    }

    fn declare_group_size(&mut self, group_id: u64, nb_objects: u64) -> Result<(), ServeError> {
        // Irrelevant once the delivery pointer moved past the group.
        if group_id < self.next_group {
            return Ok(());
        }

        let group = self.groups.entry(group_id).or_default();
        match group.nb_objects {
            Some(declared) if declared != nb_objects => Err(ServeError::Overlap),
            _ => {
                group.nb_objects = Some(nb_objects);
                Ok(())
            }
        }
    }

    // Deliver every object at the pointer that is ready, advancing through
    // closed groups.
    fn flush<S: ObjectSink>(&mut self, now: u64, sink: &mut S) -> Result<(), ServeError> {
        loop {
            let Some(group) = self.groups.get_mut(&self.next_group) else {
                break;
            };

            // The current group is exhausted; move to the next one.
            if group
                .nb_objects
                .is_some_and(|count| self.next_object >= count)
            {
                self.groups.remove(&self.next_group);
                self.next_group += 1;
                self.next_object = 0;
                continue;
            }

            let Some(object) = group.objects.get_mut(&self.next_object) else {
                break;
            };
            if !object.is_complete() {
                break;
            }

            let mode = match object.peeked {
                true => ObjectMode::Repair,
                false => ObjectMode::InSequence,
            };
            let flags = object.flags;
            let data = object.assemble();

            // Delivered objects are dropped from the buffer.
            group.objects.remove(&self.next_object);

            sink.object(now, self.next_group, self.next_object, flags, &data, mode)?;
            self.started = true;
            self.next_object += 1;
        }

        Ok(())
    }

    fn check_finished(&mut self) {
        if let Some(point) = self.final_point {
            if (self.next_group, self.next_object) >= point {
                self.finished = true;
                self.groups.clear();
            }
        }
    }
}
