use crate::FileId;

pub type Result<T, E = PlanError> = std::result::Result<T, E>;

/// Validation errors raised while adding a range to a download plan.
///
/// These are always caller bugs and are never worth retrying.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("range length must be positive")]
    /// The requested range has zero length.
    NonPositiveLength,

    #[error("range {offset}+{len} exceeds file {file} of {file_len} bytes")]
    /// The requested range does not fit inside the file.
    OutOfBounds {
        file: FileId,
        offset: u64,
        len: u64,
        file_len: u64,
    },

    #[error("file {0} is not a supported media type")]
    /// Only video and image files may be requested.
    UnsupportedFile(FileId),

    #[error("file {0} does not belong to this torrent")]
    /// The file id is not one of the torrent's files.
    UnknownFile(FileId),
}
