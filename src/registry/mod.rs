//! The coordinator of a single partial download.
//!
//! A [`PieceRegistry`] is created per [`DownloadPlan`]. Producers push
//! completed pieces into it through [`PieceSink`]s, a coordinator task
//! matches every piece against the ranges spanning it, and each range is
//! announced on the completion channel once all its pieces are in.
//!
//! Completions are announced in the order ranges become complete, not the
//! order they were planned in.
//!
//! # Termination
//!
//! The completion channel closes, and the registry is [`State::Closed`], when
//! - every range has been announced,
//! - the producers called [`PieceSink::no_more_pieces`] and the queued
//!   pieces have been processed,
//! - the registry was cancelled, or
//! - a piece arrived that no range needs, which is reported as
//!   [`RegistryError::UnmatchedPiece`] by [`PieceRegistry::finished`].

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::registry::{RegistryError, Result};
use crate::piece::Piece;
use crate::piece_range::PieceRange;
use crate::plan::DownloadPlan;
use crate::storage::PieceStorage;
use crate::PieceIndex;

use self::coordinator::Coordinator;
use self::matcher::Matcher;
use self::sink::StateCell;

mod coordinator;
mod interrupt;
mod matcher;
mod sink;

pub(crate) use interrupt::Interrupter;
pub use interrupt::Interrupt;
pub use sink::{PieceSink, State};

/// The channel on which completed ranges are announced.
pub type Completions = mpsc::Receiver<PieceRange>;

/// How the coordinator stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every range was announced.
    AllComplete,
    /// The producers finished before every range could complete.
    Drained { incomplete: usize },
    /// The download was cancelled, timed out or lost its swarm.
    Cancelled { incomplete: usize, by: Interrupt },
}

pub struct PieceRegistry {
    plan: Arc<DownloadPlan>,
    storage: Arc<PieceStorage>,
    sink: PieceSink,
    interrupter: Interrupter,
    closed: CancellationToken,
    completions: Mutex<Option<Completions>>,
    join_handle: Mutex<Option<JoinHandle<Result<Outcome>>>>,
}

impl PieceRegistry {
    /// Creates the registry and spawns its coordinator on the current tokio
    /// runtime.
    ///
    /// Cancelling `cancel` stops the coordinator and closes the completion
    /// channel. The registry only ever cancels a child of it.
    ///
    /// Fails with [`RegistryError::NothingToWaitFor`] if the plan spans no
    /// pieces, which callers should treat as a download with nothing to do.
    pub fn new(plan: DownloadPlan, cancel: CancellationToken) -> Result<Self> {
        let piece_count = plan.count_pieces();
        if piece_count == 0 {
            return Err(RegistryError::NothingToWaitFor);
        }

        let interrupter = Interrupter {
            reason: Arc::default(),
            cancel: cancel.child_token(),
        };
        let plan = Arc::new(plan);
        let storage = Arc::new(PieceStorage::new(&plan));
        let (piece_tx, piece_rx) = mpsc::channel(piece_count);
        let (completion_tx, completion_rx) = mpsc::channel(plan.len());
        let state = Arc::new(StateCell::new());
        let no_more = CancellationToken::new();
        let closed = CancellationToken::new();

        let coordinator = Coordinator {
            plan: Arc::clone(&plan),
            storage: Arc::clone(&storage),
            matcher: Matcher::new(&plan),
            piece_rx,
            completion_tx: Some(completion_tx),
            no_more: no_more.clone(),
            cancel: interrupter.cancel.clone(),
            interrupt: Arc::clone(&interrupter.reason),
            closed: closed.clone(),
            state: Arc::clone(&state),
            notified: 0,
        };
        let join_handle = tokio::spawn(coordinator.run());

        Ok(Self {
            plan,
            storage,
            sink: PieceSink {
                tx: piece_tx,
                no_more,
                state,
            },
            interrupter,
            closed,
            completions: Mutex::new(Some(completion_rx)),
            join_handle: Mutex::new(Some(join_handle)),
        })
    }

    pub fn plan(&self) -> &Arc<DownloadPlan> {
        &self.plan
    }

    pub fn storage(&self) -> &Arc<PieceStorage> {
        &self.storage
    }

    pub fn state(&self) -> State {
        self.sink.state.get()
    }

    /// Returns a producer handle for a task that publishes pieces.
    pub fn sink(&self) -> PieceSink {
        self.sink.clone()
    }

    pub async fn register_piece(&self, piece: Piece) -> Result<()> {
        self.sink.register_piece(piece).await
    }

    pub fn no_more_pieces(&self) {
        self.sink.no_more_pieces();
    }

    /// Reads a piece of a completed range, consuming one of its references.
    pub fn get_piece(&self, index: PieceIndex) -> Option<Piece> {
        self.storage.get(index)
    }

    /// Returns the channel on which every range is announced exactly once,
    /// when its last piece arrives. It closes when the registry does.
    ///
    /// There is a single subscriber, later calls fail.
    pub fn subscribe_all_parts_downloaded(&self) -> Result<Completions> {
        self.completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RegistryError::AlreadySubscribed)
    }

    /// Stops the coordinator, closing the completion channel.
    pub fn cancel(&self) {
        self.interrupter.interrupt(Interrupt::Cancelled);
    }

    /// Waits until the registry is closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// A token cancelled when the registry closes, for tasks that outlive
    /// the borrow of the registry.
    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// A handle cancelling the registry with a reason other than a plain
    /// cancel.
    pub(crate) fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Waits for the coordinator and returns how it stopped.
    ///
    /// The outcome can only be taken once.
    pub async fn finished(&self) -> Result<Outcome> {
        let join_handle = self
            .join_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RegistryError::OutcomeTaken)?;
        join_handle.await?
    }
}

impl Drop for PieceRegistry {
    fn drop(&mut self) {
        // nobody can read the pieces anymore
        self.interrupter.interrupt(Interrupt::Cancelled);
    }
}
