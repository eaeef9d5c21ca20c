use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use url::Url;

use crate::error::metainfo::{MetainfoError, Result};
use crate::media::MediaKind;
use crate::{FileId, PieceIndex, TorrentId};

/// A file inside a torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// The file's id, its position in the torrent's file list.
    pub id: FileId,
    /// The file's length in bytes.
    pub len: u64,
    /// file's relative path inside the torrent.
    pub path: PathBuf,
    /// The byte offset of the file within the torrent, when all files in
    /// torrent are viewed as a single contiguous byte array. This is always
    /// 0 for a single file torrent.
    pub torrent_offset: u64,
    /// Keys of the images already extracted from this file.
    pub images: Vec<String>,
}

impl File {
    /// Creates a file entry. Its torrent offset is assigned by [`Info::new`].
    pub fn new(id: FileId, path: impl Into<PathBuf>, len: u64) -> Self {
        Self {
            id,
            len,
            path: path.into(),
            torrent_offset: 0,
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    /// The file's path with components joined by `/`, independent of the
    /// host platform.
    pub fn name(&self) -> String {
        self.path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn kind(&self) -> MediaKind {
        MediaKind::of(&self.path)
    }
}

/// The static description of a torrent: its identity, piece size and files.
///
/// Immutable after construction, and shared behind an [`Arc`] by every plan
/// built over it.
#[derive(Clone)]
pub struct Info {
    id: TorrentId,
    name: String,
    piece_len: u64,
    files: Vec<Arc<File>>,
    /// The trackers that we can announce to.
    trackers: Vec<Url>,
    /// The descriptor bytes this info was parsed from, if any.
    raw: Bytes,
}

impl fmt::Debug for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Info")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("piece_len", &self.piece_len)
            .field("files", &self.files)
            .field("raw", &"<raw...>")
            .finish()
    }
}

impl Info {
    /// Builds an info from already known parts.
    ///
    /// The piece length must be positive, there must be at least one file
    /// and the file ids must be sequential from 0. Torrent offsets of the
    /// files are recomputed from their order and lengths.
    pub fn new(
        id: TorrentId,
        name: impl Into<String>,
        piece_len: u64,
        files: Vec<File>,
        raw: Bytes,
    ) -> Result<Self> {
        if piece_len == 0 {
            log::warn!("Piece length is 0");
            return Err(MetainfoError::InvalidMetainfo);
        }
        if files.is_empty() {
            log::warn!("Torrent has no files");
            return Err(MetainfoError::InvalidMetainfo);
        }

        let mut torrent_offset = 0;
        let mut shared = Vec::with_capacity(files.len());
        for (expected_id, mut file) in files.into_iter().enumerate() {
            if file.id != expected_id {
                log::warn!("File {:?} has id {}, expected {}", file.path, file.id, expected_id);
                return Err(MetainfoError::InvalidMetainfo);
            }
            file.torrent_offset = torrent_offset;
            torrent_offset += file.len;
            shared.push(Arc::new(file));
        }

        Ok(Self {
            id,
            name: name.into(),
            piece_len,
            files: shared,
            trackers: Vec::new(),
            raw,
        })
    }

    /// Parse from a byte buffer to crate an [`Info`] instance
    /// or return a Error about the invalid format, syntax or which come from `serde_bencode`
    ///
    /// Here are some rules:
    /// - the bencode format and syntax should correct.
    /// - the length of pieces in info should be the multiple of 20.
    /// - cannot not contain both `length` (single file) and `files` (multi files).
    /// - the file lengths should be positive.
    /// - If having multi files, the `files` should not be empty.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let metainfo: raw::Metainfo = serde_bencode::from_bytes(bytes)?;

        // the pieces field is a concatenation of 20 byte SHA-1 hashes, so it
        // must be a multiple of 20
        if metainfo.info.pieces.len() % 20 != 0 {
            return Err(MetainfoError::InvalidPieces);
        }

        let mut files = Vec::new();
        if let Some(len) = metainfo.info.len {
            if metainfo.info.files.is_some() {
                log::warn!("Metainfo cannot contain both `length` and `files`");
                return Err(MetainfoError::InvalidMetainfo);
            }
            if len == 0 {
                log::warn!("File length is 0");
                return Err(MetainfoError::InvalidMetainfo);
            }
            // the path of this file is just the torrent name
            files.push(File::new(0, metainfo.info.name.clone(), len));
        } else if let Some(raw_files) = &metainfo.info.files {
            if raw_files.is_empty() {
                log::warn!("Metainfo files must not be empty");
                return Err(MetainfoError::InvalidMetainfo);
            }

            files.reserve_exact(raw_files.len());
            for (id, file) in raw_files.iter().enumerate() {
                if file.len == 0 {
                    log::warn!("File {:?} length is 0", file.path);
                    return Err(MetainfoError::InvalidMetainfo);
                }

                let path: PathBuf = file.path.iter().collect();
                if path.as_os_str().is_empty() {
                    log::warn!("Path in metainfo is empty");
                    return Err(MetainfoError::InvalidMetainfo);
                }
                if path.is_absolute() || path == Path::new("/") {
                    log::warn!("Path {:?} is absolute", path);
                    return Err(MetainfoError::InvalidMetainfo);
                }

                files.push(File::new(id, path, file.len));
            }
        } else {
            log::warn!("No `length` or `files` key present in metainfo");
            return Err(MetainfoError::InvalidMetainfo);
        }

        let mut trackers = Vec::new();
        let announces = metainfo
            .announce_list
            .iter()
            .flatten()
            .chain(metainfo.announce.iter());
        for tracker in announces {
            let url = Url::parse(tracker)?;
            if !trackers.contains(&url) {
                trackers.push(url);
            }
        }
        if trackers.is_empty() {
            log::debug!("No trackers in metainfo");
        }

        let id = raw::info_hash(bytes)?;
        let mut info = Self::new(
            id,
            metainfo.info.name,
            metainfo.info.piece_len,
            files,
            Bytes::copy_from_slice(bytes),
        )?;
        info.trackers = trackers;
        Ok(info)
    }

    pub fn id(&self) -> TorrentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn piece_len(&self) -> u64 {
        self.piece_len
    }

    pub fn files(&self) -> &[Arc<File>] {
        &self.files
    }

    pub fn file(&self, id: FileId) -> Option<&Arc<File>> {
        self.files.get(id)
    }

    pub fn trackers(&self) -> &[Url] {
        &self.trackers
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// The sum of all file lengths.
    pub fn total_len(&self) -> u64 {
        self.files.iter().map(|f| f.len).sum()
    }

    pub fn piece_count(&self) -> usize {
        self.total_len().div_ceil(self.piece_len) as usize
    }

    /// Returns the length of the piece at the index, which is the piece
    /// length for all but the last piece.
    pub fn piece_len_at(&self, index: PieceIndex) -> Option<u64> {
        let start = index as u64 * self.piece_len;
        let total = self.total_len();
        if start >= total {
            return None;
        }
        Some(std::cmp::min(self.piece_len, total - start))
    }

    /// Return true if the torrent holds multiple files.
    pub fn is_archive(&self) -> bool {
        self.files.len() > 1
    }
}

mod raw {
    //! Only for `bencode` crate deserialize to
    //! convert into [`Info`](super::Info).
    use serde_bencode::value::Value;
    use serde_derive::Deserialize;
    use sha1::Digest;

    use super::*;

    #[derive(Debug, Deserialize)]
    pub struct Metainfo {
        pub info: Info,
        pub announce: Option<String>,
        #[serde(default)]
        #[serde(rename = "announce-list")]
        pub announce_list: Vec<Vec<String>>,
    }

    /// Hashes the info dictionary exactly as it appears in the descriptor,
    /// keys we do not model included.
    pub fn info_hash(bytes: &[u8]) -> Result<TorrentId> {
        let metainfo: Value = serde_bencode::from_bytes(bytes)?;
        let info = match metainfo {
            Value::Dict(mut dict) => dict.remove(&b"info"[..]),
            _ => None,
        };
        let info = match info {
            Some(info @ Value::Dict(_)) => serde_bencode::to_bytes(&info)?,
            _ => {
                log::warn!("Metainfo has no info dictionary");
                return Err(MetainfoError::InvalidMetainfo);
            }
        };
        let digest = sha1::Sha1::digest(&info);
        let mut info_hash = [0; 20];
        info_hash.copy_from_slice(&digest);
        Ok(TorrentId(info_hash))
    }

    #[derive(Debug, Deserialize)]
    pub struct Info {
        pub name: String,
        #[serde(with = "serde_bytes")]
        pub pieces: Vec<u8>,
        #[serde(rename = "piece length")]
        pub piece_len: u64,
        #[serde(rename = "length")]
        pub len: Option<u64>,
        pub files: Option<Vec<File>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct File {
        pub path: Vec<String>,
        #[serde(rename = "length")]
        pub len: u64,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::{assert_eq, assert_ne};
    use sha1::Digest;

    use super::*;

    fn single_file_torrent() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"d8:announce31:http://tracker.example/announce");
        b.extend_from_slice(b"4:infod6:lengthi1000e4:name9:movie.mp412:piece lengthi100e");
        b.extend_from_slice(b"6:pieces20:");
        b.extend_from_slice(&[7u8; 20]);
        b.extend_from_slice(b"ee");
        b
    }

    fn multi_file_torrent() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"d4:infod5:filesl");
        b.extend_from_slice(b"d6:lengthi1000e4:pathl5:disc19:movie.mkvee");
        b.extend_from_slice(b"d6:lengthi500e4:pathl9:cover.jpgee");
        b.extend_from_slice(b"e4:name4:pack12:piece lengthi100e6:pieces20:");
        b.extend_from_slice(&[1u8; 20]);
        b.extend_from_slice(b"ee");
        b
    }

    #[test]
    fn test_parse_single_file() {
        let info = Info::from_bytes(&single_file_torrent()).unwrap();
        assert_eq!(info.name(), "movie.mp4");
        assert_eq!(info.piece_len(), 100);
        assert_eq!(info.files().len(), 1);
        assert_eq!(info.files()[0].len, 1000);
        assert_eq!(info.files()[0].torrent_offset, 0);
        assert_eq!(info.trackers().len(), 1);
        assert_eq!(info.raw().as_ref(), single_file_torrent().as_slice());
        assert_eq!(info.piece_count(), 10);
        assert!(!info.is_archive());
    }

    #[test]
    fn test_parse_multi_file() {
        let info = Info::from_bytes(&multi_file_torrent()).unwrap();
        assert_eq!(info.files().len(), 2);
        assert_eq!(info.files()[0].name(), "disc1/movie.mkv");
        assert_eq!(info.files()[1].id, 1);
        assert_eq!(info.files()[1].torrent_offset, 1000);
        assert_eq!(info.total_len(), 1500);
        assert_eq!(info.piece_len_at(14), Some(100));
        assert_eq!(info.piece_len_at(15), None);
        assert!(info.is_archive());
    }

    #[test]
    fn test_info_hash_is_stable() {
        let a = Info::from_bytes(&single_file_torrent()).unwrap();
        let b = Info::from_bytes(&single_file_torrent()).unwrap();
        let c = Info::from_bytes(&multi_file_torrent()).unwrap();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(a.id().to_string().len(), 40);
    }

    #[test]
    fn test_info_hash_covers_unknown_keys() {
        let mut info = Vec::new();
        info.extend_from_slice(b"d6:lengthi1000e4:name9:movie.mp412:piece lengthi100e");
        info.extend_from_slice(b"6:pieces20:");
        info.extend_from_slice(&[7u8; 20]);
        info.extend_from_slice(b"7:privatei1e6:source3:XYZe");

        let mut b = Vec::new();
        b.extend_from_slice(b"d4:info");
        b.extend_from_slice(&info);
        b.extend_from_slice(b"e");

        let parsed = Info::from_bytes(&b).unwrap();
        let mut expected = [0; 20];
        expected.copy_from_slice(&sha1::Sha1::digest(&info));
        assert_eq!(parsed.id(), TorrentId(expected));
        assert_ne!(
            parsed.id(),
            Info::from_bytes(&single_file_torrent()).unwrap().id()
        );
    }

    #[test]
    fn test_reject_invalid_pieces() {
        let mut b = Vec::new();
        b.extend_from_slice(b"d4:infod6:lengthi10e4:name1:a12:piece lengthi4e6:pieces3:abcee");
        assert!(matches!(
            Info::from_bytes(&b),
            Err(MetainfoError::InvalidPieces)
        ));
    }

    #[test]
    fn test_new_validates_files() {
        let id = TorrentId([0; 20]);
        assert!(Info::new(id, "t", 0, vec![File::new(0, "a.mp4", 1)], Bytes::new()).is_err());
        assert!(Info::new(id, "t", 10, Vec::new(), Bytes::new()).is_err());
        assert!(Info::new(id, "t", 10, vec![File::new(1, "a.mp4", 1)], Bytes::new()).is_err());

        let info = Info::new(
            id,
            "t",
            10,
            vec![File::new(0, "a.mp4", 15), File::new(1, "b.mp4", 7)],
            Bytes::new(),
        )
        .unwrap();
        assert_eq!(info.files()[1].torrent_offset, 15);
        assert_eq!(info.piece_count(), 3);
        assert_eq!(info.piece_len_at(2), Some(2));
    }
}
