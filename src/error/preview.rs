use crate::error::bundle::BundleError;

/// Why no preview could be made of a range.
///
/// Never fatal to a batch: the range is reported as skipped and the next
/// one is processed.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("{0}")]
    Bundle(#[from] BundleError),

    #[error("image extraction failed: {0:#}")]
    Extract(anyhow::Error),
}
