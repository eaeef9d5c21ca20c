use std::fmt;

use bytes::Bytes;

use crate::{PieceIndex, TorrentId};

/// A piece is a fixed size chunk of a torrent's content, all but the last
/// being exactly the piece length long.
///
/// Pieces are created once, by the downloader, when all their bytes have
/// arrived. The payload is immutable and reference counted, so handing a
/// piece to the storage and to readers never copies the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Piece {
    pub torrent_id: TorrentId,
    pub index: PieceIndex,
    pub data: Bytes,
}

impl Piece {
    pub fn new(torrent_id: TorrentId, index: PieceIndex, data: impl Into<Bytes>) -> Self {
        Self {
            torrent_id,
            index,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(torrent: {} piece: {} len: {})", self.torrent_id, self.index, self.len())
    }
}
