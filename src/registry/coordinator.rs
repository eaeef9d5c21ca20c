use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::interrupt::InterruptCell;
use super::matcher::Matcher;
use super::sink::{State, StateCell};
use super::Outcome;
use crate::error::registry::{RegistryError, Result};
use crate::piece::Piece;
use crate::piece_range::PieceRange;
use crate::plan::DownloadPlan;
use crate::storage::PieceStorage;

/// The task owning the registry's matching state.
///
/// Producers only ever talk to it through the piece queue, so the matcher
/// and the counters need no lock. Only the storage is shared, with readers
/// of completed ranges.
pub(super) struct Coordinator {
    pub plan: Arc<DownloadPlan>,
    pub storage: Arc<PieceStorage>,
    pub matcher: Matcher,
    pub piece_rx: mpsc::Receiver<Piece>,
    /// Dropped, and thus closed, exactly once when the coordinator stops.
    pub completion_tx: Option<mpsc::Sender<PieceRange>>,
    pub no_more: CancellationToken,
    pub cancel: CancellationToken,
    pub interrupt: Arc<InterruptCell>,
    pub closed: CancellationToken,
    pub state: Arc<StateCell>,
    /// The number of ranges announced complete so far.
    pub notified: usize,
}

impl Coordinator {
    pub async fn run(mut self) -> Result<Outcome> {
        log::debug!(
            "Registry for torrent {} open, waiting on {} ranges over {} pieces",
            self.plan.torrent_id(),
            self.plan.len(),
            self.plan.count_pieces(),
        );
        let outcome = self.process().await;
        self.close(&outcome);
        outcome
    }

    async fn process(&mut self) -> Result<Outcome> {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    return Ok(Outcome::Cancelled {
                        incomplete: self.incomplete(),
                        by: self.interrupt.get(),
                    });
                }
                _ = self.no_more.cancelled(), if self.state.get() == State::Open => {
                    log::debug!(
                        "No more pieces for torrent {}, draining",
                        self.plan.torrent_id()
                    );
                    self.state.advance(State::Draining);
                    // queued pieces are still delivered before the queue
                    // reports its end
                    self.piece_rx.close();
                }
                piece = self.piece_rx.recv() => match piece {
                    Some(piece) => {
                        self.handle_piece(piece)?;
                        if self.notified == self.plan.len() {
                            return Ok(Outcome::AllComplete);
                        }
                    }
                    None => {
                        return Ok(Outcome::Drained { incomplete: self.incomplete() });
                    }
                },
            }
        }
    }

    fn handle_piece(&mut self, piece: Piece) -> Result<()> {
        let index = piece.index;
        if piece.torrent_id != self.plan.torrent_id() {
            log::warn!(
                "Piece {} of torrent {} registered for torrent {}",
                index,
                piece.torrent_id,
                self.plan.torrent_id()
            );
            return Err(RegistryError::UnmatchedPiece { index });
        }

        // store first, so the piece is readable by the time its ranges are
        // announced
        let completed = match self.matcher.mark(index) {
            Some(completed) => {
                self.storage.set(piece);
                completed
            }
            None => {
                log::warn!("Piece {} is not part of the plan", index);
                return Err(RegistryError::UnmatchedPiece { index });
            }
        };

        for slot in completed {
            self.notify(slot);
        }
        Ok(())
    }

    fn notify(&mut self, slot: usize) {
        let range = self.plan.ranges()[slot].clone();
        log::debug!("Range {:?} complete", range);
        if let Some(tx) = &self.completion_tx {
            // sized to the plan and each range is announced once, so this
            // only fails when the subscriber is gone
            if tx.try_send(range).is_err() {
                log::trace!("Nobody listens for range completions");
            }
        }
        self.notified += 1;
    }

    fn incomplete(&self) -> usize {
        self.plan.len() - self.notified
    }

    fn close(&mut self, outcome: &Result<Outcome>) {
        self.state.advance(State::Closed);
        self.completion_tx.take();
        self.piece_rx.close();
        self.closed.cancel();
        match outcome {
            Ok(outcome) => log::debug!(
                "Registry for torrent {} closed: {:?}",
                self.plan.torrent_id(),
                outcome
            ),
            Err(e) => log::warn!(
                "Registry for torrent {} failed: {}",
                self.plan.torrent_id(),
                e
            ),
        }
    }
}
