use crate::PieceIndex;

pub type Result<T, E = BundleError> = std::result::Result<T, E>;

/// Error type returned when a completed range cannot be reassembled.
///
/// This error is recoverable per range: a caller processing many ranges
/// should skip the failing one and carry on.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BundleError {
    #[error("piece {0} is missing")]
    /// The piece was already evicted or never arrived.
    MissingPiece(PieceIndex),

    #[error("invalid slice {start}..{end} of piece {index} with {len} bytes")]
    /// The range's offsets do not fit the piece's bytes.
    InvalidSlice {
        index: PieceIndex,
        start: usize,
        end: usize,
        len: usize,
    },
}
