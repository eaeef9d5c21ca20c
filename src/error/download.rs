use crate::error::registry::RegistryError;

pub type Result<T, E = DownloadError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("{0}")]
    Registry(#[from] RegistryError),

    #[error("download cancelled")]
    /// The download was cancelled before it started.
    Cancelled,

    #[error("download deadline exceeded with {incomplete} ranges incomplete")]
    /// The wall-clock deadline passed before every range completed.
    DeadlineExceeded { incomplete: usize },

    #[error("swarm is dead with {incomplete} ranges incomplete")]
    /// The swarm stopped answering liveness probes.
    SwarmDead { incomplete: usize },
}

impl DownloadError {
    /// Returns true when the plan had nothing to download, which callers
    /// treat as success.
    pub fn is_nothing_to_do(&self) -> bool {
        matches!(self, Self::Registry(e) if e.is_nothing_to_wait_for())
    }
}
