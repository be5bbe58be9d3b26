//! Hole detection for datagram-mode subscriptions.
//!
//! Every received fragment feeds the tracker; [GapTracker::scan] ages the
//! holes below the receive high-water and emits the ranges worth asking the
//! publisher to retransmit. Holes are re-requested after another full delay
//! if they stay open, which rides out repair datagrams that are themselves
//! lost.

use std::collections::BTreeMap;

/// One missing range within one object. A zero length asks for everything
/// from the offset to the end of the object (the extent is unknown when the
/// whole tail is missing).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RepairRange {
    pub group_id: u64,
    pub object_id: u64,
    pub offset: u64,
    pub length: u64,
    pub is_last_fragment: bool,
}

#[derive(Default)]
struct ObjectGaps {
    // Received ranges, coalesced: offset -> end.
    ranges: BTreeMap<u64, u64>,
    declared_len: Option<u64>,
}

impl ObjectGaps {
    fn feed(&mut self, offset: u64, len: u64, is_last: bool) {
        if is_last {
            self.declared_len = Some(offset + len);
        }
        if len == 0 {
            return;
        }

        let mut start = offset;
        let mut end = offset + len;

        // Absorb the neighbours this range touches.
        if let Some((&prev_start, &prev_end)) = self.ranges.range(..=start).next_back() {
            if prev_end >= start {
                start = prev_start;
                end = end.max(prev_end);
                self.ranges.remove(&prev_start);
            }
        }
        while let Some((&next_start, &next_end)) = self.ranges.range(start..).next() {
            if next_start > end {
                break;
            }
            end = end.max(next_end);
            self.ranges.remove(&next_start);
        }

        self.ranges.insert(start, end);
    }

    fn is_complete(&self) -> bool {
        match self.declared_len {
            Some(len) => self.ranges.get(&0) == Some(&len),
            None => false,
        }
    }

    fn holes(&self, group_id: u64, object_id: u64, out: &mut Vec<RepairRange>) {
        let mut at = 0;

        for (&start, &end) in &self.ranges {
            if start > at {
                out.push(RepairRange {
                    group_id,
                    object_id,
                    offset: at,
                    length: start - at,
                    is_last_fragment: false,
                });
            }
            at = end;
        }

        match self.declared_len {
            Some(len) if at < len => out.push(RepairRange {
                group_id,
                object_id,
                offset: at,
                length: len - at,
                is_last_fragment: true,
            }),
            // The tail extent is unknown; ask for the rest.
            None => out.push(RepairRange {
                group_id,
                object_id,
                offset: at,
                length: 0,
                is_last_fragment: false,
            }),
            _ => {}
        }
    }
}

/// Per-subscription record of what has not arrived yet.
#[derive(Default)]
pub struct GapTracker {
    objects: BTreeMap<(u64, u64), ObjectGaps>,
    group_counts: BTreeMap<u64, u64>,

    // Contiguous completion pointer; everything below is fully received.
    next: (u64, u64),

    // Highest (group, object) with any received data.
    max_seen: Option<(u64, u64)>,

    // Last time any fragment arrived.
    last_change: u64,

    // Last repair request per object, to pace re-requests.
    requested: BTreeMap<(u64, u64), u64>,
}

impl GapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an arrived fragment.
    pub fn feed(
        &mut self,
        now: u64,
        group_id: u64,
        object_id: u64,
        offset: u64,
        len: u64,
        is_last: bool,
        nb_objects_previous_group: u64,
    ) {
        self.last_change = now;

        if group_id > 0 && object_id == 0 && offset == 0 && nb_objects_previous_group > 0 {
            self.group_counts
                .insert(group_id - 1, nb_objects_previous_group);
        }

        if (group_id, object_id) < self.next {
            return;
        }

        self.max_seen = Some(self.max_seen.unwrap_or_default().max((group_id, object_id)));

        self.objects
            .entry((group_id, object_id))
            .or_default()
            .feed(offset, len, is_last);

        self.advance();
    }

    /// Move the start point forward; holes before it stop existing.
    pub fn set_start(&mut self, group_id: u64, object_id: u64) {
        if (group_id, object_id) > self.next {
            self.next = (group_id, object_id);
            self.objects.retain(|&id, _| id >= (group_id, object_id));
            self.requested.retain(|&id, _| id >= (group_id, object_id));
            self.advance();
        }
    }

    /// Record the final point so missing tail objects become holes.
    pub fn set_final(&mut self, group_id: u64, object_id: u64) {
        self.group_counts.insert(group_id, object_id);
        if object_id > 0 {
            self.max_seen = Some(
                self.max_seen
                    .unwrap_or_default()
                    .max((group_id, object_id - 1)),
            );
        }
        self.advance();
    }

    /// Everything up to the final point arrived.
    pub fn is_complete(&self, final_point: (u64, u64)) -> bool {
        self.next >= final_point
    }

    /// Collect the repair requests now worth sending: holes older than
    /// `delay` not already requested within the last `delay`.
    pub fn scan(&mut self, now: u64, delay: u64) -> Vec<RepairRange> {
        let mut repairs = Vec::new();

        let Some(max_seen) = self.max_seen else {
            return repairs;
        };
        if now.saturating_sub(self.last_change) < delay {
            return repairs;
        }

        let mut expect = self.next;
        let mut candidates: Vec<((u64, u64), Vec<RepairRange>)> = Vec::new();

        for (&(group_id, object_id), gaps) in self.objects.range(self.next..) {
            // Objects wholly missing between the expected id and this one.
            self.push_missing(expect, (group_id, object_id), &mut candidates);

            if !gaps.is_complete() {
                let mut holes = Vec::new();
                gaps.holes(group_id, object_id, &mut holes);
                candidates.push(((group_id, object_id), holes));
            }

            expect = self.successor((group_id, object_id));
        }

        // Missing objects past the last one we have data for.
        if expect <= max_seen {
            self.push_missing(expect, self.successor(max_seen), &mut candidates);
        }

        for (id, ranges) in candidates {
            let due = match self.requested.get(&id) {
                Some(&at) => now.saturating_sub(at) >= delay,
                None => true,
            };
            if due {
                self.requested.insert(id, now);
                repairs.extend(ranges);
            }
        }

        repairs
    }

    // Whole-object holes in [from, to), walkable only where group sizes are
    // known.
    fn push_missing(
        &self,
        from: (u64, u64),
        to: (u64, u64),
        out: &mut Vec<((u64, u64), Vec<RepairRange>)>,
    ) {
        let mut at = from;
        while at < to {
            // An unsized group cannot be walked to its end; resume at the
            // next group boundary.
            if at.0 < to.0 && !self.group_counts.contains_key(&at.0) {
                at = (at.0 + 1, 0);
                continue;
            }

            if !self.objects.contains_key(&at) {
                out.push((
                    at,
                    vec![RepairRange {
                        group_id: at.0,
                        object_id: at.1,
                        offset: 0,
                        length: 0,
                        is_last_fragment: false,
                    }],
                ));
            }
            at = self.successor(at);
        }
    }

    fn successor(&self, id: (u64, u64)) -> (u64, u64) {
        match self.group_counts.get(&id.0) {
            Some(&count) if id.1 + 1 >= count => (id.0 + 1, 0),
            _ => (id.0, id.1 + 1),
        }
    }

    // Advance the contiguous pointer over completed objects.
    fn advance(&mut self) {
        loop {
            if let Some(&count) = self.group_counts.get(&self.next.0) {
                if self.next.1 >= count {
                    self.next = (self.next.0 + 1, 0);
                    continue;
                }
            }

            match self.objects.get(&self.next) {
                Some(gaps) if gaps.is_complete() => {
                    self.objects.remove(&self.next);
                    self.requested.remove(&self.next);
                    self.next.1 += 1;
                }
                _ => break,
            }
        }
    }
}
