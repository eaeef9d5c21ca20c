use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::registry::{RegistryError, Result};
use crate::piece::Piece;

/// The lifecycle of a registry.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Accepting incoming pieces.
    Open = 0,
    /// Producers are done, queued pieces are still being processed.
    Draining = 1,
    /// The completion channel is closed, nothing changes anymore.
    Closed = 2,
}

/// The registry state, shared between the coordinator and the producers.
#[derive(Debug)]
pub(super) struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(State::Open as u8))
    }

    pub fn get(&self) -> State {
        match self.0.load(Ordering::Acquire) {
            0 => State::Open,
            1 => State::Draining,
            _ => State::Closed,
        }
    }

    /// Moves the state forward. The state never goes back, so a late
    /// transition to an earlier state is ignored.
    pub fn advance(&self, to: State) {
        self.0.fetch_max(to as u8, Ordering::AcqRel);
    }
}

/// The producer side of a registry.
///
/// Cheap to clone, so every producer task holds its own handle: one may
/// publish pieces already held locally while another publishes pieces as
/// they arrive from the swarm.
#[derive(Debug, Clone)]
pub struct PieceSink {
    pub(super) tx: mpsc::Sender<Piece>,
    pub(super) no_more: CancellationToken,
    pub(super) state: Arc<StateCell>,
}

impl PieceSink {
    /// Queues a completed piece for the coordinator.
    ///
    /// Waits if the queue is momentarily full. Fails once the producers
    /// signaled they are done or the registry closed.
    pub async fn register_piece(&self, piece: Piece) -> Result<()> {
        if self.no_more.is_cancelled() || self.state.get() != State::Open {
            return Err(RegistryError::NotAccepting);
        }
        log::trace!("Registering {:?}", piece);
        self.tx
            .send(piece)
            .await
            .map_err(|_| RegistryError::NotAccepting)
    }

    /// Signals that no more pieces will be registered.
    ///
    /// Idempotent: calling it again, or from several tasks at once, has no
    /// further effect.
    pub fn no_more_pieces(&self) {
        self.no_more.cancel();
    }

    pub fn is_accepting(&self) -> bool {
        !self.no_more.is_cancelled() && self.state.get() == State::Open
    }
}
