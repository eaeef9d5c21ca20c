use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::conf::PlanConf;
use crate::error::plan::{PlanError, Result};
use crate::metainfo::Info;
use crate::piece_range::PieceRange;
use crate::{FileId, PieceIndex, TorrentId};

/// The set of piece ranges requested for one torrent operation.
///
/// A plan owns no piece bytes. It is built sequentially and may be shared
/// and inspected concurrently afterwards; it never mutates the [`Info`].
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    info: Arc<Info>,
    ranges: Vec<PieceRange>,
    /// How many bytes from the start of each file [`DownloadPlan::add_all`]
    /// requests.
    preview_cap: u64,
    /// The batch cap used by [`DownloadPlan::batches`].
    max_request_bytes: u64,
}

impl DownloadPlan {
    pub fn new(info: Arc<Info>) -> Self {
        Self::with_conf(info, &PlanConf::default())
    }

    pub fn with_conf(info: Arc<Info>, conf: &PlanConf) -> Self {
        Self {
            info,
            ranges: Vec::new(),
            preview_cap: conf.preview_cap,
            max_request_bytes: conf.max_request_bytes,
        }
    }

    pub fn info(&self) -> &Arc<Info> {
        &self.info
    }

    pub fn torrent_id(&self) -> TorrentId {
        self.info.id()
    }

    pub fn ranges(&self) -> &[PieceRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Requests `len` bytes at `offset` of the file and appends the
    /// resulting range to the plan.
    pub fn download(&mut self, file: FileId, len: u64, offset: u64) -> Result<&PieceRange> {
        let file = self
            .info
            .file(file)
            .ok_or(PlanError::UnknownFile(file))?
            .clone();

        if len == 0 {
            return Err(PlanError::NonPositiveLength);
        }
        match offset.checked_add(len) {
            Some(end) if end <= file.len => {}
            _ => {
                return Err(PlanError::OutOfBounds {
                    file: file.id,
                    offset,
                    len,
                    file_len: file.len,
                })
            }
        }
        if !file.kind().is_supported() {
            return Err(PlanError::UnsupportedFile(file.id));
        }

        let range = PieceRange::new(self.info.id(), self.info.piece_len(), file, offset, len);
        log::trace!("Planned {:?}", range);
        self.ranges.push(range);
        Ok(&self.ranges[self.ranges.len() - 1])
    }

    /// Requests the head of every media file that has no preview yet.
    ///
    /// A file is skipped when it is not a supported media type, when it
    /// already carries extracted images, or when its id is in `covered`.
    /// Each added range starts at byte 0 and is capped at the configured
    /// preview size. Returns how many ranges were added.
    pub fn add_all(&mut self, covered: &HashSet<FileId>) -> Result<usize> {
        let candidates: Vec<_> = self
            .info
            .files()
            .iter()
            .filter(|f| f.kind().is_supported())
            .filter(|f| f.images.is_empty() && !covered.contains(&f.id))
            .map(|f| (f.id, std::cmp::min(self.preview_cap, f.len)))
            .collect();

        for (id, len) in candidates.iter() {
            self.download(*id, *len, 0)?;
        }
        log::debug!(
            "Added {} preview ranges for torrent {}",
            candidates.len(),
            self.info.id()
        );
        Ok(candidates.len())
    }

    /// Returns every piece index spanned by at least one range.
    pub fn piece_indices(&self) -> BTreeSet<PieceIndex> {
        self.ranges.iter().flat_map(|r| r.indices()).collect()
    }

    /// Returns the number of distinct pieces the plan needs. A piece shared
    /// by several ranges is counted once.
    pub fn count_pieces(&self) -> usize {
        self.piece_indices().len()
    }

    /// For each piece, how many ranges span it.
    pub fn refcounts(&self) -> HashMap<PieceIndex, usize> {
        let mut counts = HashMap::new();
        for index in self.ranges.iter().flat_map(|r| r.indices()) {
            *counts.entry(index).or_insert(0) += 1;
        }
        counts
    }

    /// The estimated size of the piece data the plan downloads.
    pub fn estimated_size(&self) -> u64 {
        self.count_pieces() as u64 * self.info.piece_len()
    }

    /// Partitions the ranges, in order, into plans whose estimated piece
    /// data does not exceed `max_bytes`, so that each can be dispatched as
    /// its own download request.
    ///
    /// A single range larger than `max_bytes` cannot be split and ends up
    /// alone in its batch.
    pub fn capped_plans(&self, max_bytes: u64) -> Vec<DownloadPlan> {
        let piece_len = self.info.piece_len();
        let mut plans = Vec::new();
        let mut batch = self.empty_like();
        let mut batch_pieces = HashSet::new();

        for range in self.ranges.iter() {
            let added = range
                .indices()
                .filter(|i| !batch_pieces.contains(i))
                .count() as u64;
            let size = (batch_pieces.len() as u64 + added) * piece_len;

            if !batch.is_empty() && size > max_bytes {
                plans.push(std::mem::replace(&mut batch, self.empty_like()));
                batch_pieces.clear();
            }
            batch_pieces.extend(range.indices());
            batch.ranges.push(range.clone());
        }
        if !batch.is_empty() {
            plans.push(batch);
        }
        plans
    }

    /// [`DownloadPlan::capped_plans`] with the configured request cap.
    pub fn batches(&self) -> Vec<DownloadPlan> {
        self.capped_plans(self.max_request_bytes)
    }

    fn empty_like(&self) -> Self {
        Self {
            info: Arc::clone(&self.info),
            ranges: Vec::new(),
            preview_cap: self.preview_cap,
            max_request_bytes: self.max_request_bytes,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::metainfo::File;

    pub(crate) fn info(piece_len: u64, files: &[(&str, u64)]) -> Arc<Info> {
        let files = files
            .iter()
            .enumerate()
            .map(|(id, (path, len))| File::new(id, *path, *len))
            .collect();
        Arc::new(Info::new(TorrentId([0x11; 20]), "test", piece_len, files, Bytes::new()).unwrap())
    }

    #[test]
    fn test_download_single_piece() {
        let mut plan = DownloadPlan::new(info(100, &[("movie.mp4", 1000)]));
        let r = plan.download(0, 50, 0).unwrap().clone();
        assert_eq!((r.start(), r.end()), (0, 0));
        assert_eq!(r.start_offset(0), 0);
        assert_eq!(r.end_offset(0), 50);
        assert_eq!(plan.count_pieces(), 1);
    }

    #[test]
    fn test_download_spanning_two_pieces() {
        let mut plan = DownloadPlan::new(info(100, &[("movie.mp4", 1000)]));
        let r = plan.download(0, 175, 25).unwrap().clone();
        assert_eq!((r.start(), r.end()), (0, 1));
        assert_eq!(r.start_offset(0), 25);
        assert_eq!(r.end_offset(1), 100);
        assert_eq!(r.piece_count(), 2);
    }

    #[test]
    fn test_download_validation() {
        let mut plan = DownloadPlan::new(info(100, &[("movie.mp4", 1000), ("notes.txt", 10)]));
        assert_eq!(plan.download(0, 0, 0).unwrap_err(), PlanError::NonPositiveLength);
        assert_eq!(
            plan.download(0, 10, 995).unwrap_err(),
            PlanError::OutOfBounds {
                file: 0,
                offset: 995,
                len: 10,
                file_len: 1000
            }
        );
        assert!(matches!(
            plan.download(0, u64::MAX, 1),
            Err(PlanError::OutOfBounds { .. })
        ));
        assert_eq!(plan.download(1, 5, 0).unwrap_err(), PlanError::UnsupportedFile(1));
        assert_eq!(plan.download(7, 5, 0).unwrap_err(), PlanError::UnknownFile(7));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_add_all_two_files() {
        let mut plan = DownloadPlan::new(info(100, &[("a.mp4", 1000), ("b.mkv", 500)]));
        assert_eq!(plan.add_all(&HashSet::new()).unwrap(), 2);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.count_pieces(), 15);
        assert_eq!((plan.ranges()[1].start(), plan.ranges()[1].end()), (10, 14));
    }

    #[test]
    fn test_add_all_skips_covered_and_unsupported() {
        let files = vec![
            File::new(0, "a.mp4", 1000).with_images(vec!["done.jpg".into()]),
            File::new(1, "b.mkv", 500),
            File::new(2, "c.nfo", 10),
            File::new(3, "d.png", 300),
        ];
        let info = Arc::new(Info::new(TorrentId([0; 20]), "t", 100, files, Bytes::new()).unwrap());
        let conf = PlanConf {
            preview_cap: 250,
            ..PlanConf::default()
        };
        let mut plan = DownloadPlan::with_conf(info, &conf);
        let covered = HashSet::from([1]);
        assert_eq!(plan.add_all(&covered).unwrap(), 1);
        let r = &plan.ranges()[0];
        assert_eq!(r.file().id, 3);
        assert_eq!(r.len(), 250);
    }

    #[test]
    fn test_count_pieces_overlap_counts_once() {
        let mut plan = DownloadPlan::new(info(100, &[("movie.mp4", 1000)]));
        plan.download(0, 300, 0).unwrap();
        plan.download(0, 300, 150).unwrap();
        assert_eq!(plan.count_pieces(), 5);
        let refs = plan.refcounts();
        assert_eq!(refs[&0], 1);
        assert_eq!(refs[&1], 2);
        assert_eq!(refs[&2], 2);
        assert_eq!(refs[&3], 1);
        assert_eq!(refs[&4], 1);
        // 0..=2 and 1..=4
        assert_eq!(refs.values().sum::<usize>(), 3 + 4);
    }

    #[test]
    fn test_capped_plans() {
        let mut plan = DownloadPlan::new(info(100, &[("movie.mp4", 1000)]));
        plan.download(0, 200, 0).unwrap(); // 0..=1
        plan.download(0, 100, 100).unwrap(); // 1..=1, shared
        plan.download(0, 200, 200).unwrap(); // 2..=3
        plan.download(0, 600, 400).unwrap(); // 4..=9, too large alone

        let batches = plan.capped_plans(300);
        let shape: Vec<_> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(shape, vec![2, 1, 1]);
        assert!(batches[..2].iter().all(|b| b.estimated_size() <= 300));
        assert_eq!(batches[2].estimated_size(), 600);

        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, plan.len());
    }

    #[test]
    fn test_batches_use_configured_cap() {
        let conf = PlanConf {
            max_request_bytes: 200,
            ..PlanConf::default()
        };
        let mut plan = DownloadPlan::with_conf(info(100, &[("movie.mp4", 1000)]), &conf);
        plan.download(0, 200, 0).unwrap();
        plan.download(0, 200, 200).unwrap();
        plan.download(0, 200, 400).unwrap();

        let batches = plan.batches();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.estimated_size() == 200));
        assert_eq!(batches[0].batches().len(), 1);

        // the default cap holds them all
        let mut plan = DownloadPlan::new(Arc::clone(plan.info()));
        plan.download(0, 1000, 0).unwrap();
        assert_eq!(plan.batches().len(), 1);
    }
}
