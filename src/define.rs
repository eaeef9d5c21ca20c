use std::fmt;

/// A SHA-1 hash digest, 20 bytes long.
pub type Sha1Hash = [u8; 20];

/// The zero-based index of a piece within the torrent.
pub type PieceIndex = usize;

/// The id of a file within a torrent, sequential from 0 in descriptor order.
pub type FileId = usize;

/// The torrent identity, which is the info hash of its descriptor.
///
/// Displayed as lowercase hex, which is also the form used in artifact names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TorrentId(pub Sha1Hash);

impl TorrentId {
    pub fn as_bytes(&self) -> &Sha1Hash {
        &self.0
    }
}

impl From<Sha1Hash> for TorrentId {
    fn from(value: Sha1Hash) -> Self {
        Self(value)
    }
}

impl fmt::Display for TorrentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TorrentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TorrentId({self})")
    }
}
