use std::collections::HashMap;

use bitvec::prelude::*;

use crate::plan::DownloadPlan;
use crate::PieceIndex;

/// Tracks which of its pieces a single range has received.
///
/// A bitfield rather than a plain counter, since the same piece may be
/// delivered more than once (e.g. from the local cache and from the swarm)
/// and must only count once.
#[derive(Debug)]
struct RangeCounter {
    start: PieceIndex,
    received: BitVec,
    count: usize,
}

impl RangeCounter {
    fn new(start: PieceIndex, piece_count: usize) -> Self {
        Self {
            start,
            received: bitvec![0; piece_count],
            count: 0,
        }
    }

    /// Records the piece and returns true if it was the range's last
    /// missing one.
    fn mark(&mut self, index: PieceIndex) -> bool {
        let already = self.received.replace(index - self.start, true);
        if already {
            return false;
        }
        self.count += 1;
        self.count == self.received.len()
    }
}

/// Matches incoming pieces to the ranges waiting for them.
///
/// Counters live in an arena indexed like the plan's ranges, and every
/// piece index maps to the arena slots of the ranges spanning it. Both are
/// built once and never resized.
#[derive(Debug)]
pub(super) struct Matcher {
    counters: Vec<RangeCounter>,
    by_piece: HashMap<PieceIndex, Box<[usize]>>,
}

impl Matcher {
    pub fn new(plan: &DownloadPlan) -> Self {
        let counters: Vec<_> = plan
            .ranges()
            .iter()
            .map(|r| RangeCounter::new(r.start(), r.piece_count()))
            .collect();

        let mut by_piece: HashMap<PieceIndex, Vec<usize>> = HashMap::new();
        for (slot, range) in plan.ranges().iter().enumerate() {
            for index in range.indices() {
                by_piece.entry(index).or_default().push(slot);
            }
        }

        Self {
            counters,
            by_piece: by_piece
                .into_iter()
                .map(|(index, slots)| (index, slots.into_boxed_slice()))
                .collect(),
        }
    }

    /// Marks the piece received for every range spanning it and returns the
    /// slots of the ranges it completed, or `None` if no range needs it.
    pub fn mark(&mut self, index: PieceIndex) -> Option<Vec<usize>> {
        let slots = self.by_piece.get(&index)?;
        let completed = slots
            .iter()
            .copied()
            .filter(|slot| self.counters[*slot].mark(index))
            .collect();
        Some(completed)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::plan::tests::info;

    #[test]
    fn test_mark_completes_overlapping_ranges() {
        let mut plan = DownloadPlan::new(info(100, &[("movie.mp4", 1000)]));
        plan.download(0, 200, 0).unwrap(); // 0..=1
        plan.download(0, 100, 100).unwrap(); // 1..=1
        plan.download(0, 200, 100).unwrap(); // 1..=2
        let mut matcher = Matcher::new(&plan);

        assert_eq!(matcher.mark(0), Some(vec![]));
        assert_eq!(matcher.mark(1), Some(vec![0, 1]));
        // a repeated piece completes nothing new
        assert_eq!(matcher.mark(1), Some(vec![]));
        assert_eq!(matcher.mark(2), Some(vec![2]));
        assert_eq!(matcher.mark(3), None);
    }
}
