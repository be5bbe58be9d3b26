//! The per-URL fragment cache, split into [CacheWriter] and [CacheReader].
//!
//! A single writer (the local source pump, or the bridge from an upstream
//! subscription) inserts fragments as they arrive. Any number of readers
//! attach cursors positioned by a subscriber [Intent] and walk the cache in
//! canonical (group, object, offset) order; every insert wakes the cursors
//! that are waiting at or before it.
//!
//! Eviction follows the entry's [EvictionPolicy]: `Retain` frees a fragment
//! once every attached cursor has read past it, `Drop` discards everything
//! below each new group boundary and forces catch-up subscribers to join at
//! the boundary.

use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::Arc;

use bytes::Bytes;

use crate::coding::Url;
use crate::message::{EvictionPolicy, Intent};
use crate::watch::State;

use super::ServeError;

/// A fragment as stored in (and served from) a cache entry.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedFragment {
    pub group_id: u64,
    pub object_id: u64,
    pub offset: u64,
    pub is_last_fragment: bool,

    /// Objects in the previous group; nonzero only on a group-opening
    /// fragment.
    pub nb_objects_previous_group: u64,

    /// Microseconds spent queued at the sender, accumulated hop by hop.
    pub queue_delay: u64,

    /// Reserved; carried untouched.
    pub flags: u8,

    pub payload: Bytes,
}

impl CachedFragment {
    fn position(&self) -> (u64, u64, u64) {
        (self.group_id, self.object_id, self.offset)
    }

    fn opens_group(&self) -> bool {
        self.object_id == 0 && self.offset == 0
    }
}

impl From<crate::message::Fragment> for CachedFragment {
    fn from(msg: crate::message::Fragment) -> Self {
        Self {
            group_id: msg.group_id,
            object_id: msg.object_id,
            offset: msg.offset,
            is_last_fragment: msg.is_last_fragment,
            nb_objects_previous_group: msg.nb_objects_previous_group,
            queue_delay: 0,
            flags: msg.flags,
            payload: msg.payload,
        }
    }
}

impl From<crate::data::Datagram> for CachedFragment {
    fn from(datagram: crate::data::Datagram) -> Self {
        Self {
            group_id: datagram.group_id,
            object_id: datagram.object_id,
            offset: datagram.offset,
            is_last_fragment: datagram.is_last_fragment,
            nb_objects_previous_group: datagram.nb_objects_previous_group,
            queue_delay: datagram.queue_delay,
            flags: datagram.flags,
            payload: datagram.payload,
        }
    }
}

/// Result of a non-blocking cursor read.
#[derive(Debug, PartialEq)]
pub enum CursorNext {
    Fragment(CachedFragment),

    /// The fragment at the cursor has not arrived yet.
    WouldBlock,

    /// The cursor is past the final object; nothing more will come.
    Eof,
}

/// Static information about a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaCache {
    pub url: Url,
}

impl MediaCache {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn produce(self) -> (CacheWriter, CacheReader) {
        let state = State::new(CacheState::default());
        let info = Arc::new(self);

        let guard = Arc::new(WriterGuard {
            state: state.clone(),
        });

        let writer = CacheWriter {
            state: state.clone(),
            info: info.clone(),
            _guard: guard,
        };
        let reader = CacheReader { state, info };

        (writer, reader)
    }
}

struct CacheState {
    // Canonical fragment index.
    fragments: BTreeMap<(u64, u64, u64), CachedFragment>,

    // Group id -> number of objects, learned from group-opening fragments
    // and the final object report.
    group_counts: BTreeMap<u64, u64>,

    // First byte position not yet contiguously cached.
    frontier: (u64, u64, u64),

    // Highest contiguously cached complete object.
    high: Option<(u64, u64)>,

    // Highest group with any cached fragment.
    current_group: u64,
    seen_any: bool,

    // One past the last object, once known.
    final_point: Option<(u64, u64)>,

    policy: EvictionPolicy,

    // (group, object) floor: everything below was evicted or never existed.
    low: (u64, u64),

    // Attached subscriber cursors, by id, with their next position.
    cursors: HashMap<u64, (u64, u64, u64)>,
    next_cursor: u64,

    closed: Result<(), ServeError>,
}

impl Default for CacheState {
    fn default() -> Self {
        Self {
            fragments: Default::default(),
            group_counts: Default::default(),
            frontier: Default::default(),
            high: Default::default(),
            current_group: Default::default(),
            seen_any: Default::default(),
            final_point: Default::default(),
            policy: Default::default(),
            low: Default::default(),
            cursors: Default::default(),
            next_cursor: Default::default(),
            closed: Ok(()),
        }
    }
}

impl CacheState {
    fn check_open(&self) -> Result<(), ServeError> {
        self.closed.clone()
    }

    // Move the contiguity frontier across everything now cached in order.
    fn advance_frontier(&mut self) {
        loop {
            if let Some(&count) = self.group_counts.get(&self.frontier.0) {
                if self.frontier.1 >= count {
                    self.frontier = (self.frontier.0 + 1, 0, 0);
                    continue;
                }
            }

            let Some(fragment) = self.fragments.get(&self.frontier) else {
                break;
            };

            if fragment.is_last_fragment {
                self.high = Some((self.frontier.0, self.frontier.1));
                self.frontier = (self.frontier.0, self.frontier.1 + 1, 0);
            } else {
                self.frontier.2 += fragment.payload.len() as u64;
            }
        }
    }

    fn declare_group_count(&mut self, group_id: u64, count: u64) -> Result<(), ServeError> {
        match self.group_counts.get(&group_id) {
            Some(&declared) if declared != count => Err(ServeError::Overlap),
            _ => {
                self.group_counts.insert(group_id, count);
                Ok(())
            }
        }
    }

    // Discard every fragment below the (group, object) floor.
    fn evict_below(&mut self, floor: (u64, u64)) {
        if floor <= self.low {
            return;
        }

        self.fragments = self.fragments.split_off(&(floor.0, floor.1, 0));
        self.low = floor;

        let floor_pos = (floor.0, floor.1, 0);
        if self.frontier < floor_pos {
            self.frontier = floor_pos;
            self.advance_frontier();
        }
    }

    // Under the retain policy, free fragments every attached cursor has
    // passed. The floor stays at object granularity so an object a cursor
    // is inside keeps all of its fragments.
    fn evict_consumed(&mut self) {
        if self.policy != EvictionPolicy::Retain {
            return;
        }

        let Some(&min) = self.cursors.values().min() else {
            return;
        };

        let floor = (min.0, min.1);
        if floor > self.low {
            self.fragments = self.fragments.split_off(&(floor.0, floor.1, 0));
            self.low = floor;
        }
    }
}

struct WriterGuard {
    state: State<CacheState>,
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        if let Some(mut state) = self.state.lock_mut() {
            if state.final_point.is_none() && state.closed.is_ok() {
                state.closed = Err(ServeError::Done);
            }
        }
    }
}

/// Inserts fragments into a cache entry. Cloned handles share the entry;
/// when the last one drops without a final object report, readers see
/// [ServeError::Done].
#[derive(Clone)]
pub struct CacheWriter {
    state: State<CacheState>,
    pub info: Arc<MediaCache>,
    _guard: Arc<WriterGuard>,
}

impl std::fmt::Debug for CacheWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWriter").field("info", &self.info).finish()
    }
}

impl CacheWriter {
    /// Merge one fragment. Duplicate inserts are no-ops; conflicting
    /// overlap is a protocol error.
    pub fn insert(&mut self, fragment: CachedFragment) -> Result<(), ServeError> {
        let mut state = self.state.lock_mut().ok_or(ServeError::Cancel)?;
        state.check_open()?;

        // Data below the floor was already discarded; late repeats of it
        // are non-events.
        if (fragment.group_id, fragment.object_id) < state.low {
            return Ok(());
        }

        // An empty fragment carries no information unless it ends an object.
        if fragment.payload.is_empty() && !fragment.is_last_fragment {
            return Ok(());
        }

        if fragment.group_id > 0 && fragment.opens_group() && fragment.nb_objects_previous_group > 0
        {
            state.declare_group_count(
                fragment.group_id - 1,
                fragment.nb_objects_previous_group,
            )?;
        }

        let position = fragment.position();
        let len = fragment.payload.len() as u64;
        let object = (fragment.group_id, fragment.object_id);

        // Ranges within an object must coincide exactly or be disjoint.
        if let Some((_, prev)) = state
            .fragments
            .range((object.0, object.1, 0)..=position)
            .next_back()
        {
            let prev_end = prev.offset + prev.payload.len() as u64;
            if prev.offset == fragment.offset {
                // Repeats may differ in queue delay; only the bytes matter.
                if prev.payload == fragment.payload
                    && prev.is_last_fragment == fragment.is_last_fragment
                {
                    return Ok(());
                }
                return Err(ServeError::Overlap);
            }
            if prev_end > fragment.offset || (prev.is_last_fragment && prev_end <= fragment.offset)
            {
                return Err(ServeError::Overlap);
            }
        }
        if let Some((_, next)) = state
            .fragments
            .range((object.0, object.1, fragment.offset + 1)..(object.0, object.1 + 1, 0))
            .next()
        {
            if fragment.offset + len > next.offset || fragment.is_last_fragment {
                return Err(ServeError::Overlap);
            }
        }

        // A new group boundary; under the drop policy, history goes.
        if fragment.group_id > state.current_group || !state.seen_any {
            if state.policy == EvictionPolicy::Drop && state.seen_any {
                state.evict_below((fragment.group_id, 0));
            }
            state.current_group = fragment.group_id;
        }
        state.seen_any = true;

        state.fragments.insert(position, fragment);
        state.advance_frontier();

        Ok(())
    }

    /// Record that the media ends just before (group_id, object_id).
    pub fn set_final(&mut self, group_id: u64, object_id: u64) -> Result<(), ServeError> {
        let mut state = self.state.lock_mut().ok_or(ServeError::Cancel)?;
        state.check_open()?;

        match state.final_point {
            Some(point) if point != (group_id, object_id) => return Err(ServeError::Overlap),
            _ => state.final_point = Some((group_id, object_id)),
        }

        state.declare_group_count(group_id, object_id)?;
        state.advance_frontier();

        Ok(())
    }

    /// Raise the floor: data before (group_id, object_id) never existed
    /// here. Used when the upstream reports its own start point.
    pub fn set_start(&mut self, group_id: u64, object_id: u64) -> Result<(), ServeError> {
        let mut state = self.state.lock_mut().ok_or(ServeError::Cancel)?;
        state.check_open()?;
        state.evict_below((group_id, object_id));
        Ok(())
    }

    pub fn set_policy(&mut self, policy: EvictionPolicy) -> Result<(), ServeError> {
        let mut state = self.state.lock_mut().ok_or(ServeError::Cancel)?;
        state.check_open()?;
        state.policy = policy;
        Ok(())
    }

    /// Close the entry with an error; cursors observe it once drained.
    pub fn close(self, err: ServeError) -> Result<(), ServeError> {
        let mut state = self.state.lock_mut().ok_or(ServeError::Cancel)?;
        state.closed.clone()?;
        state.closed = Err(err);
        Ok(())
    }

    pub fn high_water(&self) -> Option<(u64, u64)> {
        self.state.lock().high
    }

    pub fn low_water(&self) -> (u64, u64) {
        self.state.lock().low
    }

    /// True once the final point is known and everything up to it is cached.
    pub fn is_complete(&self) -> bool {
        let state = self.state.lock();
        match state.final_point {
            Some((group_id, object_id)) => state.frontier >= (group_id, object_id, 0),
            None => false,
        }
    }
}

impl Deref for CacheWriter {
    type Target = MediaCache;

    fn deref(&self) -> &Self::Target {
        &self.info
    }
}

/// Read access to a cache entry; cloned freely and handed to subscribers.
#[derive(Clone)]
pub struct CacheReader {
    state: State<CacheState>,
    pub info: Arc<MediaCache>,
}

impl CacheReader {
    /// Attach a cursor positioned by the subscriber's intent.
    pub fn subscribe(&self, intent: Intent) -> Result<CacheCursor, ServeError> {
        let state = self.state.lock();

        let pos = match intent {
            Intent::CurrentGroup => match state.seen_any {
                true => (state.current_group, 0, 0),
                false => (0, 0, 0),
            },
            Intent::NextGroup => match state.seen_any {
                true => (state.current_group + 1, 0, 0),
                false => (0, 0, 0),
            },
            Intent::StartPoint {
                group_id,
                object_id,
            } => {
                if (group_id, object_id) < state.low {
                    return Err(ServeError::StartPointUnavailable);
                }
                (group_id, object_id, 0)
            }
        };

        let mut state = state.into_mut().ok_or(ServeError::Cancel)?;
        let id = state.next_cursor;
        state.next_cursor += 1;
        state.cursors.insert(id, pos);

        Ok(CacheCursor {
            state: self.state.clone(),
            info: self.info.clone(),
            id,
            pos,
        })
    }

    /// Assemble the object bytes in [offset, offset+length), if fully cached.
    pub fn read_range(
        &self,
        group_id: u64,
        object_id: u64,
        offset: u64,
        length: u64,
    ) -> Option<Bytes> {
        let state = self.state.lock();
        let end = offset + length;
        let mut data = Vec::with_capacity(length as usize);
        let mut at = offset;

        for fragment in state
            .fragments
            .range((group_id, object_id, 0)..(group_id, object_id + 1, 0))
            .map(|(_, f)| f)
        {
            let frag_end = fragment.offset + fragment.payload.len() as u64;
            if frag_end <= at {
                continue;
            }
            if fragment.offset > at {
                return None; // hole
            }
            let from = (at - fragment.offset) as usize;
            let to = (frag_end.min(end) - fragment.offset) as usize;
            data.extend_from_slice(&fragment.payload[from..to]);
            at = frag_end.min(end);
            if at == end {
                return Some(Bytes::from(data));
            }
        }

        None
    }

    pub fn high_water(&self) -> Option<(u64, u64)> {
        self.state.lock().high
    }

    pub fn low_water(&self) -> (u64, u64) {
        self.state.lock().low
    }

    pub fn final_point(&self) -> Option<(u64, u64)> {
        self.state.lock().final_point
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.state.lock().policy
    }

    /// The object's total length, once its last fragment is cached.
    pub fn object_len(&self, group_id: u64, object_id: u64) -> Option<u64> {
        let state = self.state.lock();
        state
            .fragments
            .range((group_id, object_id, 0)..(group_id, object_id + 1, 0))
            .next_back()
            .and_then(|(_, f)| {
                f.is_last_fragment
                    .then(|| f.offset + f.payload.len() as u64)
            })
    }

    /// Number of objects in the group, once declared.
    pub fn group_size(&self, group_id: u64) -> Option<u64> {
        self.state.lock().group_counts.get(&group_id).copied()
    }
}

impl Deref for CacheReader {
    type Target = MediaCache;

    fn deref(&self) -> &Self::Target {
        &self.info
    }
}

/// One subscriber's walk through a cache entry, in canonical order.
pub struct CacheCursor {
    state: State<CacheState>,
    pub info: Arc<MediaCache>,
    id: u64,
    pos: (u64, u64, u64),
}

impl std::fmt::Debug for CacheCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCursor")
            .field("info", &self.info)
            .field("id", &self.id)
            .field("pos", &self.pos)
            .finish()
    }
}

impl CacheCursor {
    /// The next position this cursor will serve.
    pub fn position(&self) -> (u64, u64) {
        (self.pos.0, self.pos.1)
    }

    /// Non-blocking read of the next fragment in canonical order.
    pub fn try_next(&mut self) -> Result<CursorNext, ServeError> {
        let state = self.state.lock();

        match Self::peek(&state, &mut self.pos) {
            CursorNext::Fragment(fragment) => {
                let mut state = state.into_mut().ok_or(ServeError::Cancel)?;

                // Advance past the served fragment.
                self.pos = match fragment.is_last_fragment {
                    true => (fragment.group_id, fragment.object_id + 1, 0),
                    false => (
                        fragment.group_id,
                        fragment.object_id,
                        fragment.offset + fragment.payload.len() as u64,
                    ),
                };
                state.cursors.insert(self.id, self.pos);
                state.evict_consumed();

                Ok(CursorNext::Fragment(fragment))
            }
            CursorNext::Eof => Ok(CursorNext::Eof),
            CursorNext::WouldBlock => {
                state.check_open()?;
                Ok(CursorNext::WouldBlock)
            }
        }
    }

    /// Read the next fragment, waiting for it to arrive if necessary.
    /// Returns None once past the final object.
    pub async fn next(&mut self) -> Result<Option<CachedFragment>, ServeError> {
        loop {
            {
                let state = self.state.lock();

                match Self::peek(&state, &mut self.pos) {
                    CursorNext::Fragment(fragment) => {
                        let mut state = state.into_mut().ok_or(ServeError::Cancel)?;

                        self.pos = match fragment.is_last_fragment {
                            true => (fragment.group_id, fragment.object_id + 1, 0),
                            false => (
                                fragment.group_id,
                                fragment.object_id,
                                fragment.offset + fragment.payload.len() as u64,
                            ),
                        };
                        state.cursors.insert(self.id, self.pos);
                        state.evict_consumed();

                        return Ok(Some(fragment));
                    }
                    CursorNext::Eof => return Ok(None),
                    CursorNext::WouldBlock => {
                        state.check_open()?;
                        match state.modified() {
                            Some(notify) => notify,
                            None => return Err(ServeError::Done),
                        }
                    }
                }
            }
            .await; // Try again when the cache changes
        }
    }

    // Resolve the fragment at the cursor without consuming it, clamping the
    // position to the eviction floor and across closed groups.
    fn peek(state: &CacheState, pos: &mut (u64, u64, u64)) -> CursorNext {
        loop {
            // Everything below the floor is gone; join at the boundary.
            let floor = (state.low.0, state.low.1, 0);
            if *pos < floor {
                *pos = floor;
            }

            if let Some(&count) = state.group_counts.get(&pos.0) {
                if pos.1 >= count {
                    *pos = (pos.0 + 1, 0, 0);
                    continue;
                }
            }

            if let Some(final_point) = state.final_point {
                if (pos.0, pos.1) >= final_point {
                    return CursorNext::Eof;
                }
            }

            return match state.fragments.get(pos) {
                Some(fragment) => CursorNext::Fragment(fragment.clone()),
                None => CursorNext::WouldBlock,
            };
        }
    }
}

impl Drop for CacheCursor {
    fn drop(&mut self) {
        if let Some(mut state) = self.state.lock_mut() {
            state.cursors.remove(&self.id);
            state.evict_consumed();
        }
    }
}

impl Deref for CacheCursor {
    type Target = MediaCache;

    fn deref(&self) -> &Self::Target {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(
        group_id: u64,
        object_id: u64,
        offset: u64,
        is_last: bool,
        nb_prev: u64,
        payload: &'static [u8],
    ) -> CachedFragment {
        CachedFragment {
            group_id,
            object_id,
            offset,
            is_last_fragment: is_last,
            nb_objects_previous_group: nb_prev,
            queue_delay: 0,
            flags: 0,
            payload: Bytes::from_static(payload),
        }
    }

    fn produce() -> (CacheWriter, CacheReader) {
        MediaCache::new(Url::from("example.com/media")).produce()
    }

    // Two groups of two single-fragment objects.
    fn fill(writer: &mut CacheWriter) {
        writer.insert(fragment(0, 0, 0, true, 0, b"aa")).unwrap();
        writer.insert(fragment(0, 1, 0, true, 0, b"bb")).unwrap();
        writer.insert(fragment(1, 0, 0, true, 2, b"cc")).unwrap();
        writer.insert(fragment(1, 1, 0, true, 0, b"dd")).unwrap();
    }

    fn drain(cursor: &mut CacheCursor) -> Vec<(u64, u64, u64)> {
        let mut out = Vec::new();
        while let Ok(CursorNext::Fragment(frag)) = cursor.try_next() {
            out.push(frag.position());
        }
        out
    }

    #[test]
    fn fan_out_identical() {
        let (mut writer, reader) = produce();

        let mut first = reader.subscribe(Intent::CurrentGroup).unwrap();
        let mut second = reader.subscribe(Intent::CurrentGroup).unwrap();

        fill(&mut writer);
        writer.set_final(1, 2).unwrap();

        let expected = vec![(0, 0, 0), (0, 1, 0), (1, 0, 0), (1, 1, 0)];
        assert_eq!(drain(&mut first), expected);
        assert_eq!(drain(&mut second), expected);
        assert_eq!(first.try_next().unwrap(), CursorNext::Eof);
        assert_eq!(second.try_next().unwrap(), CursorNext::Eof);
    }

    #[test]
    fn would_block_until_insert() {
        let (mut writer, reader) = produce();
        let mut cursor = reader.subscribe(Intent::CurrentGroup).unwrap();

        assert_eq!(cursor.try_next().unwrap(), CursorNext::WouldBlock);

        writer.insert(fragment(0, 0, 0, false, 0, b"aa")).unwrap();
        assert!(matches!(
            cursor.try_next().unwrap(),
            CursorNext::Fragment(_)
        ));
        assert_eq!(cursor.try_next().unwrap(), CursorNext::WouldBlock);

        // The hole at (0, 0, 2) blocks the cursor even though later data
        // exists.
        writer.insert(fragment(0, 1, 0, true, 0, b"bb")).unwrap();
        assert_eq!(cursor.try_next().unwrap(), CursorNext::WouldBlock);

        writer.insert(fragment(0, 0, 2, true, 0, b"cc")).unwrap();
        assert_eq!(drain(&mut cursor), vec![(0, 0, 2), (0, 1, 0)]);
    }

    #[test]
    fn high_water_tracks_contiguity() {
        let (mut writer, _reader) = produce();

        writer.insert(fragment(0, 1, 0, true, 0, b"bb")).unwrap();
        assert_eq!(writer.high_water(), None);

        writer.insert(fragment(0, 0, 0, true, 0, b"aa")).unwrap();
        assert_eq!(writer.high_water(), Some((0, 1)));
    }

    #[test]
    fn intent_current_group() {
        let (mut writer, reader) = produce();
        fill(&mut writer);

        // Group 1 is the currently forming group.
        let mut cursor = reader.subscribe(Intent::CurrentGroup).unwrap();
        assert_eq!(drain(&mut cursor), vec![(1, 0, 0), (1, 1, 0)]);
    }

    #[test]
    fn intent_next_group() {
        let (mut writer, reader) = produce();
        fill(&mut writer);

        let mut cursor = reader.subscribe(Intent::NextGroup).unwrap();
        assert_eq!(cursor.try_next().unwrap(), CursorNext::WouldBlock);

        writer.insert(fragment(2, 0, 0, true, 2, b"ee")).unwrap();
        assert_eq!(drain(&mut cursor), vec![(2, 0, 0)]);
    }

    #[test]
    fn intent_start_point() {
        let (mut writer, reader) = produce();
        fill(&mut writer);

        let mut cursor = reader
            .subscribe(Intent::StartPoint {
                group_id: 0,
                object_id: 1,
            })
            .unwrap();
        assert_eq!(
            drain(&mut cursor),
            vec![(0, 1, 0), (1, 0, 0), (1, 1, 0)]
        );
    }

    #[test]
    fn conflicting_overlap_rejected() {
        let (mut writer, _reader) = produce();

        writer.insert(fragment(0, 0, 0, false, 0, b"aa")).unwrap();
        // Same offset, different contents.
        let res = writer.insert(fragment(0, 0, 0, false, 0, b"xx"));
        assert_eq!(res.unwrap_err(), ServeError::Overlap);

        // Straddling the existing range.
        let res = writer.insert(fragment(0, 0, 1, false, 0, b"yy"));
        assert_eq!(res.unwrap_err(), ServeError::Overlap);

        // Exact duplicate is fine.
        writer.insert(fragment(0, 0, 0, false, 0, b"aa")).unwrap();
    }

    #[test]
    fn retain_eviction_follows_slowest_cursor() {
        let (mut writer, reader) = produce();

        let mut fast = reader.subscribe(Intent::CurrentGroup).unwrap();
        let mut slow = reader.subscribe(Intent::CurrentGroup).unwrap();
        fill(&mut writer);

        drain(&mut fast);
        assert_eq!(reader.low_water(), (0, 0));

        // The slow cursor reads one object; everything before it frees.
        slow.try_next().unwrap();
        assert_eq!(reader.low_water(), (0, 1));

        // Dropping the slow cursor releases the rest.
        drop(slow);
        assert_eq!(reader.low_water(), (1, 2));
    }

    #[test]
    fn drop_policy_discards_previous_groups() {
        let (mut writer, reader) = produce();
        writer.set_policy(EvictionPolicy::Drop).unwrap();

        let mut lagging = reader.subscribe(Intent::CurrentGroup).unwrap();

        writer.insert(fragment(0, 0, 0, true, 0, b"aa")).unwrap();
        writer.insert(fragment(0, 1, 0, true, 0, b"bb")).unwrap();
        writer.insert(fragment(1, 0, 0, true, 2, b"cc")).unwrap();

        assert_eq!(reader.low_water(), (1, 0));

        // A start point below the boundary is gone.
        let res = reader.subscribe(Intent::StartPoint {
            group_id: 0,
            object_id: 0,
        });
        assert_eq!(res.unwrap_err(), ServeError::StartPointUnavailable);

        // The lagging cursor joins at the boundary.
        assert_eq!(drain(&mut lagging), vec![(1, 0, 0)]);
    }

    #[test]
    fn read_range_spans_fragments() {
        let (mut writer, reader) = produce();

        writer.insert(fragment(0, 0, 0, false, 0, b"abcd")).unwrap();
        writer.insert(fragment(0, 0, 4, true, 0, b"efgh")).unwrap();

        assert_eq!(
            reader.read_range(0, 0, 2, 4).unwrap(),
            Bytes::from_static(b"cdef")
        );
        assert_eq!(reader.read_range(0, 1, 0, 1), None);
    }

    #[test]
    fn done_when_writer_dropped_without_fin() {
        let (writer, reader) = produce();
        let mut cursor = reader.subscribe(Intent::CurrentGroup).unwrap();

        drop(writer);
        assert_eq!(cursor.try_next().unwrap_err(), ServeError::Done);
    }
}
