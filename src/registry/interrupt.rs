use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Why a registry was cancelled.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    /// Cancelled by its owner, or by the owner's token.
    Cancelled = 1,
    /// The download deadline passed.
    DeadlineExceeded = 2,
    /// The swarm stopped answering liveness probes.
    SwarmDead = 3,
}

/// The first recorded interrupt reason. Later reasons are ignored.
#[derive(Debug, Default)]
pub(super) struct InterruptCell(AtomicU8);

impl InterruptCell {
    fn set(&self, reason: Interrupt) {
        let _ = self
            .0
            .compare_exchange(0, reason as u8, Ordering::AcqRel, Ordering::Acquire);
    }

    /// The recorded reason, `Cancelled` if the token was cancelled without
    /// one.
    pub fn get(&self) -> Interrupt {
        match self.0.load(Ordering::Acquire) {
            2 => Interrupt::DeadlineExceeded,
            3 => Interrupt::SwarmDead,
            _ => Interrupt::Cancelled,
        }
    }
}

/// Cancels a registry, recording why.
#[derive(Debug, Clone)]
pub(crate) struct Interrupter {
    pub(super) reason: Arc<InterruptCell>,
    pub(super) cancel: CancellationToken,
}

impl Interrupter {
    pub fn interrupt(&self, reason: Interrupt) {
        self.reason.set(reason);
        self.cancel.cancel();
    }
}
