use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::PieceSource;
use crate::error::registry::RegistryError;
use crate::metainfo::Info;
use crate::piece::Piece;
use crate::plan::DownloadPlan;
use crate::registry::PieceSink;
use crate::{PieceIndex, TorrentId};

/// A source serving pieces already held in memory, such as the pieces kept
/// from an earlier download of the same torrent.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    torrent_id: TorrentId,
    pieces: HashMap<PieceIndex, Bytes>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, torrent_id: TorrentId) -> Self {
        Self {
            name: name.into(),
            torrent_id,
            pieces: HashMap::new(),
        }
    }

    /// Splits the torrent's whole content into its pieces.
    pub fn from_content(name: impl Into<String>, info: &Info, content: &[u8]) -> Self {
        let mut source = Self::new(name, info.id());
        let content = Bytes::copy_from_slice(content);
        let piece_len = info.piece_len() as usize;
        for index in 0..content.len().div_ceil(piece_len) {
            let end = std::cmp::min((index + 1) * piece_len, content.len());
            source.insert(index, content.slice(index * piece_len..end));
        }
        source
    }

    pub fn insert(&mut self, index: PieceIndex, data: impl Into<Bytes>) {
        self.pieces.insert(index, data.into());
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

#[async_trait]
impl PieceSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(
        &self,
        plan: Arc<DownloadPlan>,
        sink: PieceSink,
        cancel: CancellationToken,
    ) -> anyhow::Result<usize> {
        let mut published = 0;
        for index in plan.piece_indices() {
            let data = match self.pieces.get(&index) {
                Some(data) => data.clone(),
                None => continue,
            };
            let piece = Piece::new(self.torrent_id, index, data);
            let registered = tokio::select! {
                _ = cancel.cancelled() => break,
                registered = sink.register_piece(piece) => registered,
            };
            match registered {
                Ok(()) => published += 1,
                // the registry got what it needed from other sources
                Err(RegistryError::NotAccepting) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(published)
    }
}
