//! The boundary to the piece transport.
//!
//! The core never speaks the wire protocol. A [`Downloader`] turns a plan
//! into a live [`PieceRegistry`] and feeds it from one or more
//! [`PieceSource`]s, e.g. the pieces already held locally and the pieces
//! arriving from the swarm.
//!
//! [`SwarmDownloader`] runs every source as its own producer task, with a
//! supervisor that signals the end of pieces once all producers are done,
//! and a watchdog that cancels the download when its deadline passes or the
//! swarm stops responding to liveness probes. [`finished`] tells those
//! apart from a plain cancel.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::conf::DownloadConf;
use crate::error::download::{DownloadError, Result};
use crate::plan::DownloadPlan;
use crate::registry::{Interrupt, Interrupter, Outcome, PieceRegistry, PieceSink};

mod memory;

pub use memory::MemorySource;

/// Downloads the pieces of a plan.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Starts downloading and returns the registry the pieces are pushed
    /// into.
    ///
    /// Implementations must register every piece they obtain and signal the
    /// end of pieces exactly once. A plan without pieces fails with an error
    /// for which [`DownloadError::is_nothing_to_do`] holds.
    async fn download_parts(
        &self,
        cancel: CancellationToken,
        plan: DownloadPlan,
    ) -> Result<PieceRegistry>;
}

/// A producer of pieces.
#[async_trait]
pub trait PieceSource: Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &str;

    /// Registers into the sink every piece of the plan this source can
    /// provide and returns how many it registered.
    ///
    /// Must stop, releasing whatever it subscribed to, once `cancel` fires.
    async fn publish(
        &self,
        plan: Arc<DownloadPlan>,
        sink: PieceSink,
        cancel: CancellationToken,
    ) -> anyhow::Result<usize>;
}

/// Tells whether the swarm can still deliver pieces.
#[async_trait]
pub trait SwarmHealth: Send + Sync {
    async fn is_alive(&self) -> bool;
}

/// A downloader running its sources as parallel producers.
pub struct SwarmDownloader {
    sources: Vec<Arc<dyn PieceSource>>,
    health: Option<Arc<dyn SwarmHealth>>,
    conf: DownloadConf,
}

impl SwarmDownloader {
    pub fn new(conf: DownloadConf) -> Self {
        Self {
            sources: Vec::new(),
            health: None,
            conf,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn PieceSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_health(mut self, health: Arc<dyn SwarmHealth>) -> Self {
        self.health = Some(health);
        self
    }
}

#[async_trait]
impl Downloader for SwarmDownloader {
    async fn download_parts(
        &self,
        cancel: CancellationToken,
        plan: DownloadPlan,
    ) -> Result<PieceRegistry> {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let registry_cancel = cancel.child_token();
        let registry = PieceRegistry::new(plan, registry_cancel.clone())?;
        let plan = Arc::clone(registry.plan());
        log::info!(
            "Downloading {} pieces of torrent {} from {} sources",
            plan.count_pieces(),
            plan.torrent_id(),
            self.sources.len()
        );

        let producers: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                let plan = Arc::clone(&plan);
                let sink = registry.sink();
                let token = registry_cancel.child_token();
                tokio::spawn(async move {
                    let result = source.publish(plan, sink, token).await;
                    (source, result)
                })
            })
            .collect();

        let sink = registry.sink();
        tokio::spawn(async move {
            for joined in join_all(producers).await {
                match joined {
                    Ok((source, Ok(count))) => {
                        log::debug!("Source {} published {} pieces", source.name(), count)
                    }
                    Ok((source, Err(e))) => {
                        log::warn!("Source {} failed: {:#}", source.name(), e)
                    }
                    Err(e) => log::warn!("Source task failed: {}", e),
                }
            }
            sink.no_more_pieces();
        });

        tokio::spawn(watchdog(
            registry_cancel,
            registry.interrupter(),
            registry.closed_token(),
            self.health.clone(),
            self.conf.clone(),
        ));

        Ok(registry)
    }
}

/// Waits for a download to stop and returns how it ended.
///
/// A download stopped by its deadline or by a dead swarm fails with
/// [`DownloadError::DeadlineExceeded`] or [`DownloadError::SwarmDead`].
pub async fn finished(registry: &PieceRegistry) -> Result<Outcome> {
    match registry.finished().await? {
        Outcome::Cancelled {
            incomplete,
            by: Interrupt::DeadlineExceeded,
        } => Err(DownloadError::DeadlineExceeded { incomplete }),
        Outcome::Cancelled {
            incomplete,
            by: Interrupt::SwarmDead,
        } => Err(DownloadError::SwarmDead { incomplete }),
        outcome => Ok(outcome),
    }
}

/// Why the watchdog stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Watch {
    Closed,
    Cancelled,
    DeadlineExceeded,
    SwarmDead,
}

/// Cancels the download once its deadline passes or the swarm is found
/// dead, whichever comes first. Returns as soon as the registry closes.
///
/// `cancel` is the producers' parent token and is cancelled on return.
async fn watchdog(
    cancel: CancellationToken,
    interrupter: Interrupter,
    closed: CancellationToken,
    health: Option<Arc<dyn SwarmHealth>>,
    conf: DownloadConf,
) -> Watch {
    let deadline = time::sleep(conf.timeout);
    tokio::pin!(deadline);
    let mut probe = time::interval(conf.probe_interval);
    probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    probe.tick().await;

    let watch = loop {
        tokio::select! {
            _ = closed.cancelled() => break Watch::Closed,
            _ = cancel.cancelled() => break Watch::Cancelled,
            _ = &mut deadline => break Watch::DeadlineExceeded,
            _ = probe.tick() => {
                if let Some(health) = &health {
                    if !health.is_alive().await {
                        break Watch::SwarmDead;
                    }
                }
            }
        }
    };

    match watch {
        Watch::DeadlineExceeded => {
            log::warn!("Download deadline of {:?} exceeded", conf.timeout);
            interrupter.interrupt(Interrupt::DeadlineExceeded);
        }
        Watch::SwarmDead => {
            log::warn!("Swarm is no longer alive");
            interrupter.interrupt(Interrupt::SwarmDead);
        }
        Watch::Cancelled | Watch::Closed => log::trace!("Watchdog stopped: {:?}", watch),
    }
    cancel.cancel();
    watch
}
