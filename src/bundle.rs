//! Reassembly of a completed range into the bytes that were requested.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::bundle::{BundleError, Result};
use crate::piece::Piece;
use crate::piece_range::PieceRange;
use crate::registry::PieceRegistry;
use crate::storage::PieceStorage;
use crate::{PieceIndex, TorrentId};

/// Anything pieces of a completed range can be read from.
pub trait PieceReader {
    /// Returns the piece at the index, consuming one of its references.
    fn get_piece(&self, index: PieceIndex) -> Option<Piece>;
}

impl PieceReader for PieceStorage {
    fn get_piece(&self, index: PieceIndex) -> Option<Piece> {
        self.get(index)
    }
}

impl PieceReader for PieceRegistry {
    fn get_piece(&self, index: PieceIndex) -> Option<Piece> {
        PieceRegistry::get_piece(self, index)
    }
}

/// The reassembled bytes of one range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPart {
    torrent_id: TorrentId,
    range: PieceRange,
    data: Bytes,
}

impl MediaPart {
    pub fn torrent_id(&self) -> TorrentId {
        self.torrent_id
    }

    pub fn range(&self) -> &PieceRange {
        &self.range
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    pub fn name(&self) -> String {
        self.range.name()
    }
}

/// Reassembles a completed range from the pieces of a registry.
#[derive(Debug, Clone)]
pub struct BundlePlan {
    range: PieceRange,
}

impl BundlePlan {
    pub fn new(range: PieceRange) -> Self {
        Self { range }
    }

    pub fn range(&self) -> &PieceRange {
        &self.range
    }

    /// Reads every piece of the range, in index order, and concatenates the
    /// requested part of each.
    ///
    /// Each piece read consumes one of its references, so a range can only
    /// be bundled once. If a piece is missing the pieces read before it
    /// are consumed all the same.
    pub fn bundle<R>(&self, reader: &R) -> Result<MediaPart>
    where
        R: PieceReader + ?Sized,
    {
        let range = &self.range;
        let mut data = BytesMut::with_capacity(range.len() as usize);

        for index in range.indices() {
            let piece = reader
                .get_piece(index)
                .ok_or(BundleError::MissingPiece(index))?;

            let start = range.start_offset(index);
            let end = range.end_offset(index);
            if start > end || end > piece.len() {
                return Err(BundleError::InvalidSlice {
                    index,
                    start,
                    end,
                    len: piece.len(),
                });
            }
            data.put_slice(&piece.data[start..end]);
        }

        Ok(MediaPart {
            torrent_id: range.torrent_id(),
            range: range.clone(),
            data: data.freeze(),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::plan::tests::info;
    use crate::plan::DownloadPlan;

    /// The torrent's content, where each byte is its offset modulo 251.
    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn fill(storage: &PieceStorage, plan: &DownloadPlan, content: &[u8]) {
        let piece_len = plan.info().piece_len() as usize;
        for (index, chunk) in content.chunks(piece_len).enumerate() {
            storage.set(Piece::new(plan.torrent_id(), index, chunk.to_vec()));
        }
    }

    #[test]
    fn test_bundle_reproduces_requested_bytes() {
        let total = content(1500);
        let mut plan = DownloadPlan::new(info(100, &[("a.mp4", 1000), ("b.mkv", 500)]));
        let requests = [(0, 50, 0), (0, 175, 25), (0, 1000, 0), (1, 333, 77), (1, 1, 499)];
        for (file, len, offset) in requests {
            plan.download(file, len, offset).unwrap();
        }
        let storage = PieceStorage::new(&plan);
        fill(&storage, &plan, &total);

        for (range, (file, len, offset)) in plan.ranges().iter().zip(requests) {
            let part = BundlePlan::new(range.clone()).bundle(&storage).unwrap();
            let start = (file as u64 * 1000 + offset) as usize;
            assert_eq!(part.data().as_ref(), &total[start..start + len as usize]);
            assert_eq!(part.name(), range.name());
        }
        // every reference consumed, nothing left behind
        assert_eq!(storage.total_refs(), 0);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_bundle_missing_piece() {
        let mut plan = DownloadPlan::new(info(100, &[("a.mp4", 1000)]));
        plan.download(0, 300, 0).unwrap();
        let storage = PieceStorage::new(&plan);
        storage.set(Piece::new(plan.torrent_id(), 0, vec![0u8; 100]));

        let err = BundlePlan::new(plan.ranges()[0].clone())
            .bundle(&storage)
            .unwrap_err();
        assert_eq!(err, BundleError::MissingPiece(1));
    }

    #[test]
    fn test_bundle_short_piece() {
        let mut plan = DownloadPlan::new(info(100, &[("a.mp4", 1000)]));
        plan.download(0, 90, 0).unwrap();
        let storage = PieceStorage::new(&plan);
        storage.set(Piece::new(plan.torrent_id(), 0, vec![0u8; 40]));

        let err = BundlePlan::new(plan.ranges()[0].clone())
            .bundle(&storage)
            .unwrap_err();
        assert_eq!(
            err,
            BundleError::InvalidSlice {
                index: 0,
                start: 0,
                end: 90,
                len: 40
            }
        );
    }

    #[tokio::test]
    async fn test_bundle_from_registry_after_completion() {
        let total = content(1000);
        let mut plan = DownloadPlan::new(info(100, &[("a.mp4", 1000)]));
        plan.download(0, 150, 100).unwrap();
        plan.download(0, 60, 180).unwrap();

        let registry = PieceRegistry::new(plan.clone(), CancellationToken::new()).unwrap();
        let mut completions = registry.subscribe_all_parts_downloaded().unwrap();
        for index in plan.piece_indices() {
            let chunk = total[index * 100..(index + 1) * 100].to_vec();
            registry
                .register_piece(Piece::new(plan.torrent_id(), index, chunk))
                .await
                .unwrap();
        }

        while let Some(range) = completions.recv().await {
            let part = BundlePlan::new(range.clone()).bundle(&registry).unwrap();
            let start = range.start() * 100 + range.start_offset(range.start());
            assert_eq!(part.data().len() as u64, range.len());
            assert_eq!(part.data().as_ref(), &total[start..start + part.data().len()]);
        }
        assert!(registry.storage().is_empty());
    }
}
