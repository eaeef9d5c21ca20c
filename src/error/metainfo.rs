pub use serde_bencode::Error as BencodeError;

pub type Result<T, E = MetainfoError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum MetainfoError {
    #[error("{0}")]
    /// The descriptor is not well formed bencode.
    Bencode(BencodeError),

    #[error("invalid metainfo")]
    /// A required key is missing or holds an impossible value, such as a
    /// zero length file.
    InvalidMetainfo,

    #[error("invalid pieces")]
    /// The pieces field is not a whole number of SHA-1 hashes.
    InvalidPieces,

    #[error("invalid tracker url: {0}")]
    /// An announce url failed to parse.
    InvalidTrackerUrl(url::ParseError),
}

impl From<BencodeError> for MetainfoError {
    fn from(error: BencodeError) -> Self {
        Self::Bencode(error)
    }
}

impl From<url::ParseError> for MetainfoError {
    fn from(error: url::ParseError) -> Self {
        Self::InvalidTrackerUrl(error)
    }
}
