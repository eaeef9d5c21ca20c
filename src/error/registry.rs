use crate::PieceIndex;

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("nothing to wait for")]
    /// The plan spans no pieces. Callers treat this as a successful no-op.
    NothingToWaitFor,

    #[error("registry no longer accepts pieces")]
    /// A piece was registered after the producers signaled they were done,
    /// or after the coordinator stopped.
    NotAccepting,

    #[error("piece {index} is not part of the plan")]
    /// A piece arrived that no range needs, either from an unrelated torrent
    /// or because the protocol layer delivered the wrong index. This is fatal
    /// to the coordinator.
    UnmatchedPiece { index: PieceIndex },

    #[error("completions were already subscribed to")]
    /// The completion stream can only be handed out once.
    AlreadySubscribed,

    #[error("registry outcome was already taken")]
    /// [`PieceRegistry::finished`](crate::registry::PieceRegistry::finished)
    /// hands out the outcome once.
    OutcomeTaken,

    #[error("coordinator task lost: {0}")]
    /// The coordinator task panicked or was aborted.
    Coordinator(String),
}

impl RegistryError {
    /// Returns true for the zero-piece plan case, which is not a failure.
    pub fn is_nothing_to_wait_for(&self) -> bool {
        matches!(self, Self::NothingToWaitFor)
    }
}

impl From<tokio::task::JoinError> for RegistryError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Coordinator(value.to_string())
    }
}
