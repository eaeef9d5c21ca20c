use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::metainfo::File;
use crate::{PieceIndex, TorrentId};

/// Replaces path separators in file names so a name stays a single path
/// segment.
const SEPARATOR_REPLACEMENT: &str = "--";

/// The span of pieces needed to satisfy one requested byte range of a file.
///
/// Both ends of the span are inclusive. Only the first and the last piece of
/// the span may be partially used, see [`PieceRange::start_offset`] and
/// [`PieceRange::end_offset`].
#[derive(Clone, PartialEq, Eq)]
pub struct PieceRange {
    torrent_id: TorrentId,
    file: Arc<File>,
    start: PieceIndex,
    end: PieceIndex,
    /// Byte offset into the first piece.
    first_offset: usize,
    /// Exclusive byte offset into the last piece.
    last_end: usize,
    piece_len: u64,
}

impl PieceRange {
    /// Maps `len` bytes at `offset` into the file onto the torrent's pieces.
    ///
    /// The caller must have validated that `len > 0`, `piece_len > 0` and
    /// that `offset + len <= file.len`.
    pub(crate) fn new(
        torrent_id: TorrentId,
        piece_len: u64,
        file: Arc<File>,
        offset: u64,
        len: u64,
    ) -> Self {
        debug_assert!(len > 0);
        debug_assert!(piece_len > 0);
        debug_assert!(offset + len <= file.len);

        let start_byte = file.torrent_offset + offset;
        // the last byte, inclusive, so that a range ending exactly on a piece
        // boundary does not spill into the next piece.
        let last_byte = start_byte + len - 1;

        Self {
            torrent_id,
            start: (start_byte / piece_len) as PieceIndex,
            end: (last_byte / piece_len) as PieceIndex,
            first_offset: (start_byte % piece_len) as usize,
            last_end: (last_byte % piece_len) as usize + 1,
            piece_len,
            file,
        }
    }

    pub fn torrent_id(&self) -> TorrentId {
        self.torrent_id
    }

    pub fn file(&self) -> &Arc<File> {
        &self.file
    }

    pub fn start(&self) -> PieceIndex {
        self.start
    }

    pub fn end(&self) -> PieceIndex {
        self.end
    }

    pub fn piece_len(&self) -> u64 {
        self.piece_len
    }

    pub fn indices(&self) -> RangeInclusive<PieceIndex> {
        self.start..=self.end
    }

    pub fn contains(&self, index: PieceIndex) -> bool {
        self.indices().contains(&index)
    }

    /// Returns the number of pieces spanned by this range.
    pub fn piece_count(&self) -> usize {
        self.end - self.start + 1
    }

    /// Returns the offset of the first requested byte within the piece.
    ///
    /// This is 0 for all but the first piece of the range.
    pub fn start_offset(&self, index: PieceIndex) -> usize {
        if index == self.start {
            self.first_offset
        } else {
            0
        }
    }

    /// Returns the exclusive offset of the last requested byte within the
    /// piece.
    ///
    /// This is the piece length for all but the last piece of the range.
    pub fn end_offset(&self, index: PieceIndex) -> usize {
        if index == self.end {
            self.last_end
        } else {
            self.piece_len as usize
        }
    }

    /// Returns the number of requested bytes.
    pub fn len(&self) -> u64 {
        let spanned = self.piece_count() as u64 * self.piece_len;
        spanned - self.first_offset as u64 - (self.piece_len - self.last_end as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The deterministic artifact name of this range:
    /// `{torrent}.{file}.{start}-{end}.{file name}`.
    pub fn name(&self) -> String {
        format!(
            "{}.{}.{}-{}.{}",
            self.torrent_id,
            self.file.id,
            self.start,
            self.end,
            sanitize(&self.file.name()),
        )
    }

    /// The storage key of the image extracted from this range.
    pub fn image_key(&self) -> String {
        format!("{}.jpg", self.name())
    }
}

impl fmt::Debug for PieceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PieceRange")
            .field("file", &self.file.id)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("start_offset", &self.first_offset)
            .field("end_offset", &self.last_end)
            .finish()
    }
}

fn sanitize(name: &str) -> String {
    name.replace(['/', '\\'], SEPARATOR_REPLACEMENT)
}
