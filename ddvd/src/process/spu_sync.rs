use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use log::{trace, warn};

use crate::structs::spu::SpuPendingEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Identical to the previous entry; not queued again.
    Coalesced,
    /// Queued after dropping the oldest pending entries.
    Overflow { dropped: u64 },
}

/// Fixed-capacity ring of decoded subpictures waiting for their PTS.
///
/// `produced` and `consumed` only grow; `produced - consumed` never exceeds
/// the capacity.
#[derive(Debug)]
pub struct SpuRing {
    slots: Vec<Option<SpuPendingEntry>>,
    produced: u64,
    consumed: u64,
    last: Option<u64>,
}

impl SpuRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            produced: 0,
            consumed: 0,
            last: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        (self.produced - self.consumed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.produced == self.consumed
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    fn slot(&self, index: u64) -> usize {
        (index % self.slots.len() as u64) as usize
    }

    fn fingerprint(entry: &SpuPendingEntry) -> u64 {
        let mut hasher = DefaultHasher::new();
        entry.target_pts.hash(&mut hasher);
        entry.spu.hash(&mut hasher);
        hasher.finish()
    }

    pub fn push(&mut self, entry: SpuPendingEntry) -> PushOutcome {
        let fingerprint = Self::fingerprint(&entry);
        if self.last == Some(fingerprint) {
            trace!("Coalescing repeated subpicture at pts {}", entry.target_pts);
            return PushOutcome::Coalesced;
        }
        self.last = Some(fingerprint);

        let cap = self.slots.len() as u64;
        let mut outcome = PushOutcome::Queued;
        if self.produced - self.consumed >= cap {
            let consumed = self.produced - cap + 1;
            let dropped = consumed - self.consumed;
            for i in self.consumed..consumed {
                let slot = self.slot(i);
                self.slots[slot] = None;
            }
            self.consumed = consumed;
            warn!("Subpicture ring full, dropped {dropped} pending entries");
            outcome = PushOutcome::Overflow { dropped };
        }

        let slot = self.slot(self.produced);
        self.slots[slot] = Some(entry);
        self.produced += 1;
        outcome
    }

    /// Oldest pending entry.
    pub fn front(&self) -> Option<&SpuPendingEntry> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.slot(self.consumed)].as_ref()
    }

    pub fn pop(&mut self) -> Option<SpuPendingEntry> {
        if self.is_empty() {
            return None;
        }
        let slot = self.slot(self.consumed);
        self.consumed += 1;
        self.slots[slot].take()
    }

    /// Discards everything pending.
    pub fn flush(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.consumed = self.produced;
        self.last = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// The presentation clock has not reached the entry yet.
    Wait,
    Render,
    /// Too old to show; consume without drawing.
    Drop,
}

/// Decides what to do with a pending subpicture at presentation time `pts`.
///
/// `video_pts` is the last PTS the demultiplexer saw on the video stream.
/// While it is ahead of `pts` the stream is contiguous and any due entry
/// is rendered. Otherwise an entry is rendered only within `tolerance`
/// ticks of the clock and, once the video PTS has jumped backwards, only
/// if the stream that ended (last PTS `previous_video_pts`) reached it.
pub fn sync_decision(
    spu_pts: u64,
    pts: u64,
    video_pts: u64,
    previous_video_pts: Option<u64>,
    tolerance: u64,
) -> SyncDecision {
    if spu_pts > pts {
        SyncDecision::Wait
    } else if video_pts > pts
        || (previous_video_pts.is_none_or(|prev| prev > spu_pts) && pts - spu_pts < tolerance)
    {
        SyncDecision::Render
    } else {
        SyncDecision::Drop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::spu::{BoundingBox, DecodedSpu, SpuKind};

    fn entry(pts: u64, fill: u8) -> SpuPendingEntry {
        SpuPendingEntry {
            spu: DecodedSpu {
                kind: SpuKind::Subtitle,
                bbox: BoundingBox {
                    x1: 0,
                    y1: 0,
                    x2: 1,
                    y2: 0,
                },
                display_time: 100,
                colors: None,
                alpha: None,
                pixels: vec![fill; 2],
            },
            target_pts: pts,
            highlight: None,
        }
    }

    #[test]
    fn ring_stays_bounded() {
        let mut ring = SpuRing::new(8);
        for i in 0..20u64 {
            let outcome = ring.push(entry(i * 1000, 1));
            assert!(ring.produced() - ring.consumed() <= 8);
            if i < 8 {
                assert_eq!(outcome, PushOutcome::Queued);
            } else {
                assert_eq!(outcome, PushOutcome::Overflow { dropped: 1 });
            }
        }
        assert_eq!(ring.len(), 8);
        assert_eq!(ring.front().map(|e| e.target_pts), Some(12_000));

        let mut seen = Vec::new();
        while let Some(e) = ring.pop() {
            seen.push(e.target_pts / 1000);
        }
        assert_eq!(seen, (12..20).collect::<Vec<_>>());
        assert!(ring.is_empty());
    }

    #[test]
    fn repeated_subpictures_are_coalesced() {
        let mut ring = SpuRing::new(4);
        assert_eq!(ring.push(entry(90_000, 1)), PushOutcome::Queued);
        assert_eq!(ring.push(entry(90_000, 1)), PushOutcome::Coalesced);
        assert_eq!(ring.push(entry(90_000, 2)), PushOutcome::Queued);
        assert_eq!(ring.push(entry(90_000, 1)), PushOutcome::Queued);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn flush_discards_pending() {
        let mut ring = SpuRing::new(4);
        ring.push(entry(1, 1));
        ring.push(entry(2, 1));
        ring.flush();
        assert!(ring.is_empty());
        assert_eq!(ring.consumed(), 2);
        assert!(ring.pop().is_none());

        // The same subpicture after a seek is shown again.
        assert_eq!(ring.push(entry(2, 1)), PushOutcome::Queued);
    }

    #[test]
    fn sync_decisions() {
        assert_eq!(sync_decision(90_000, 89_999, 95_000, None, 180_000), SyncDecision::Wait);
        assert_eq!(sync_decision(90_000, 90_005, 95_000, None, 180_000), SyncDecision::Render);
        // Clock past the last demultiplexed picture, no jump seen yet.
        assert_eq!(sync_decision(90_000, 90_005, 0, None, 180_000), SyncDecision::Render);
        assert_eq!(sync_decision(90_000, 400_000, 10, None, 180_000), SyncDecision::Drop);

        // After a backward jump the ended stream must have reached the entry.
        assert_eq!(
            sync_decision(90_000, 200_000, 10, Some(250_000), 180_000),
            SyncDecision::Render
        );
        assert_eq!(
            sync_decision(90_000, 150_000, 10, Some(10), 180_000),
            SyncDecision::Drop
        );
        assert_eq!(
            sync_decision(90_000, 400_000, 10, Some(450_000), 180_000),
            SyncDecision::Drop
        );
        // A contiguous stream ignores the jump history.
        assert_eq!(
            sync_decision(90_000, 150_000, 160_000, Some(10), 180_000),
            SyncDecision::Render
        );
    }
}
