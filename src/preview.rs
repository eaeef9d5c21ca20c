//! Best-effort preview generation over the ranges of a download.
//!
//! Every completed range is reassembled and turned into an image: a video's
//! head goes through the [`ImageExtractor`], an image file is its own
//! preview. A range that fails is skipped and reported, it never aborts the
//! rest of the batch.

use bytes::Bytes;

use crate::bundle::{BundlePlan, PieceReader};
use crate::error::preview::PreviewError;
use crate::error::registry::{RegistryError, Result};
use crate::media::MediaKind;
use crate::piece_range::PieceRange;
use crate::registry::{Outcome, PieceRegistry};

/// Extracts a still image from the head of a video.
pub trait ImageExtractor: Send + Sync {
    fn extract_image(&self, data: &[u8], offset_seconds: u32) -> anyhow::Result<Vec<u8>>;
}

/// A produced preview image, stored under its key.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub key: String,
    pub range: PieceRange,
    pub data: Bytes,
}

/// A range that produced no preview.
#[derive(Debug)]
pub struct Skipped {
    pub range: PieceRange,
    pub reason: PreviewError,
}

#[derive(Debug)]
pub struct PreviewReport {
    pub artifacts: Vec<Artifact>,
    pub skipped: Vec<Skipped>,
    /// How the registry stopped. A failed registry keeps the artifacts made
    /// before it failed.
    pub outcome: Result<Outcome>,
}

impl PreviewReport {
    /// Returns true if every range of the plan produced a preview.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && matches!(self.outcome, Ok(Outcome::AllComplete))
    }
}

pub struct PreviewGenerator<E> {
    extractor: E,
    offset_seconds: u32,
}

impl<E: ImageExtractor> PreviewGenerator<E> {
    pub fn new(extractor: E, offset_seconds: u32) -> Self {
        Self {
            extractor,
            offset_seconds,
        }
    }

    /// Makes a preview of every range as it completes, until the registry
    /// closes.
    ///
    /// Fails only if the completions were already subscribed to. Per-range
    /// failures end up in [`PreviewReport::skipped`], a registry failure in
    /// [`PreviewReport::outcome`].
    pub async fn run(&self, registry: &PieceRegistry) -> Result<PreviewReport> {
        let mut completions = registry.subscribe_all_parts_downloaded()?;
        let mut artifacts = Vec::new();
        let mut skipped = Vec::new();

        while let Some(range) = completions.recv().await {
            match self.generate(registry, &range) {
                Ok(artifact) => {
                    log::debug!("Made preview {}", artifact.key);
                    artifacts.push(artifact);
                }
                Err(reason) => {
                    log::warn!("Skipping preview of {}: {}", range.name(), reason);
                    skipped.push(Skipped { range, reason });
                }
            }
        }

        let outcome = registry.finished().await;
        if let Err(e) = &outcome {
            log::warn!("Previews stopped early: {}", e);
        }
        Ok(PreviewReport {
            artifacts,
            skipped,
            outcome,
        })
    }

    /// Makes the preview of a single completed range.
    pub fn generate<R>(&self, reader: &R, range: &PieceRange) -> Result<Artifact, PreviewError>
    where
        R: PieceReader + ?Sized,
    {
        let part = BundlePlan::new(range.clone()).bundle(reader)?;
        let data = match range.file().kind() {
            MediaKind::Image => part.into_data(),
            _ => self
                .extractor
                .extract_image(part.data(), self.offset_seconds)
                .map(Bytes::from)
                .map_err(PreviewError::Extract)?,
        };
        Ok(Artifact {
            key: range.image_key(),
            range: range.clone(),
            data,
        })
    }
}
