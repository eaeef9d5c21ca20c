//! The in-memory piece cache of a single download.
//!
//! Pieces are large and a whole torrent may not fit in memory, so a piece
//! lives here only as long as some range still has to read it. Each piece
//! index starts with a reference per range of the plan that spans it, every
//! successful [`PieceStorage::get`] consumes one, and the piece is evicted
//! the moment the last reference is gone.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::piece::Piece;
use crate::plan::DownloadPlan;
use crate::PieceIndex;

#[derive(Debug, Default)]
struct Inner {
    pieces: HashMap<PieceIndex, Piece>,
    /// The number of outstanding reads per piece. An index without entry
    /// has no reader left.
    refs: HashMap<PieceIndex, usize>,
}

/// A refcounted piece cache that evicts a piece once fully consumed.
///
/// `get` mutates the refcounts, so reads and writes serialize on the same
/// lock.
#[derive(Debug)]
pub struct PieceStorage {
    inner: Mutex<Inner>,
}

impl PieceStorage {
    pub fn new(plan: &DownloadPlan) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pieces: HashMap::with_capacity(plan.count_pieces()),
                refs: plan.refcounts(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // the state is consistent between statements, a panicking reader
        // cannot leave it half updated
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the piece, replacing any previous bytes at its index.
    ///
    /// Refcounts are left untouched, so storing the same piece twice is
    /// harmless. A piece no range is waiting for is not stored, as nothing
    /// would ever evict it, and `false` is returned.
    pub fn set(&self, piece: Piece) -> bool {
        let mut inner = self.lock();
        if !inner.refs.contains_key(&piece.index) {
            log::trace!("Dropping piece {} nobody reads", piece.index);
            return false;
        }
        inner.pieces.insert(piece.index, piece);
        true
    }

    /// Returns the piece at the index, consuming one of its references.
    ///
    /// When the last reference is consumed the piece is evicted, and any
    /// later call returns `None` even if the piece is stored again.
    pub fn get(&self, index: PieceIndex) -> Option<Piece> {
        let mut inner = self.lock();
        let piece = inner.pieces.get(&index)?.clone();

        let remaining = match inner.refs.get_mut(&index) {
            Some(refs) => {
                *refs -= 1;
                *refs
            }
            None => 0,
        };
        if remaining == 0 {
            inner.refs.remove(&index);
            inner.pieces.remove(&index);
            log::trace!("Evicted piece {}", index);
        }
        Some(piece)
    }

    /// The outstanding reads of the piece at the index.
    pub fn refcount(&self, index: PieceIndex) -> usize {
        self.lock().refs.get(&index).copied().unwrap_or(0)
    }

    /// The outstanding reads of all pieces.
    pub fn total_refs(&self) -> usize {
        self.lock().refs.values().sum()
    }

    /// The number of pieces currently held in memory.
    pub fn len(&self) -> usize {
        self.lock().pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::plan::tests::info;

    fn overlapping_plan() -> DownloadPlan {
        let mut plan = DownloadPlan::new(info(100, &[("movie.mp4", 1000)]));
        plan.download(0, 300, 0).unwrap(); // 0..=2
        plan.download(0, 100, 200).unwrap(); // 2..=2
        plan.download(0, 250, 150).unwrap(); // 1..=3
        plan
    }

    fn piece(plan: &DownloadPlan, index: PieceIndex) -> Piece {
        Piece::new(plan.torrent_id(), index, vec![index as u8; 100])
    }

    #[test]
    fn test_refcounts_match_plan() {
        let plan = overlapping_plan();
        let storage = PieceStorage::new(&plan);
        assert_eq!(storage.refcount(0), 1);
        assert_eq!(storage.refcount(1), 2);
        assert_eq!(storage.refcount(2), 3);
        assert_eq!(storage.refcount(3), 1);
        assert_eq!(storage.refcount(4), 0);

        let mass: usize = plan.ranges().iter().map(|r| r.piece_count()).sum();
        assert_eq!(storage.total_refs(), mass);
    }

    #[test]
    fn test_get_consumes_references_then_evicts() {
        let plan = overlapping_plan();
        let storage = PieceStorage::new(&plan);
        assert!(storage.set(piece(&plan, 2)));

        for _ in 0..3 {
            assert_eq!(storage.get(2).map(|p| p.index), Some(2));
        }
        assert_eq!(storage.get(2), None);
        assert_eq!(storage.refcount(2), 0);
        assert!(storage.is_empty());

        // once evicted it never comes back
        assert!(!storage.set(piece(&plan, 2)));
        assert_eq!(storage.get(2), None);
    }

    #[test]
    fn test_get_missing_does_not_consume() {
        let plan = overlapping_plan();
        let storage = PieceStorage::new(&plan);
        assert_eq!(storage.get(1), None);
        assert_eq!(storage.refcount(1), 2);
    }

    #[test]
    fn test_set_is_idempotent() {
        let plan = overlapping_plan();
        let storage = PieceStorage::new(&plan);
        assert!(storage.set(piece(&plan, 1)));
        assert!(storage.set(piece(&plan, 1)));
        assert_eq!(storage.refcount(1), 2);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_set_unplanned_piece_is_not_kept() {
        let plan = overlapping_plan();
        let storage = PieceStorage::new(&plan);
        assert!(!storage.set(piece(&plan, 9)));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_concurrent_readers() {
        let mut plan = DownloadPlan::new(info(100, &[("movie.mp4", 1000)]));
        for _ in 0..16 {
            plan.download(0, 100, 0).unwrap();
        }
        let storage = Arc::new(PieceStorage::new(&plan));
        storage.set(piece(&plan, 0));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let storage = Arc::clone(&storage);
                std::thread::spawn(move || storage.get(0).is_some())
            })
            .collect();
        let hits = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|hit| *hit)
            .count();
        assert_eq!(hits, 16);
        assert!(storage.is_empty());
    }
}
