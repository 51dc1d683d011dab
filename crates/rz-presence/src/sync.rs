//! Batched durable synchronization of peer status.
//!
//! Heartbeats mutate the in-memory registry only; this synchronizer moves
//! accumulated changes to the durable store in one gateway call per cycle.
//! A failed flush re-marks the drained peers so nothing is lost, at the
//! cost of a possible duplicate write if the store applied part of the
//! batch before failing. Writes are idempotent upserts, so duplicates are
//! harmless.

use crate::registry::PeerRegistry;
use rz_db_gateway::{ConnectionFactory, DbError, StoreGateway};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Result of one flush cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing had changed since the last cycle.
    Idle,
    /// All drained updates were persisted.
    Flushed { count: usize },
    /// The gateway call failed; the updates were re-marked for retry.
    Failed { count: usize, error: DbError },
}

/// Moves dirty registry state to the durable store on a fixed cadence.
pub struct BatchSynchronizer<F: ConnectionFactory> {
    registry: Arc<PeerRegistry>,
    gateway: Arc<StoreGateway<F>>,
    interval: Duration,
}

impl<F: ConnectionFactory> BatchSynchronizer<F> {
    pub fn new(
        registry: Arc<PeerRegistry>,
        gateway: Arc<StoreGateway<F>>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            gateway,
            interval,
        }
    }

    /// Drain dirty peers and persist them in a single batch.
    pub async fn flush_once(&self) -> FlushOutcome {
        let updates = self.registry.drain_dirty();
        if updates.is_empty() {
            return FlushOutcome::Idle;
        }
        match self.gateway.flush_status_updates(&updates).await {
            Ok(()) => {
                debug!(count = updates.len(), "flushed status batch");
                FlushOutcome::Flushed {
                    count: updates.len(),
                }
            }
            Err(error) => {
                warn!(count = updates.len(), %error, "status flush failed, will retry");
                self.registry.remark_dirty(&updates);
                FlushOutcome::Failed {
                    count: updates.len(),
                    error,
                }
            }
        }
    }

    /// Flush loop; runs until `shutdown` flips to true, then attempts one
    /// final flush so a clean shutdown leaves the store current.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush_once().await;
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        if let FlushOutcome::Failed { count, error } = self.flush_once().await {
            warn!(count, %error, "final flush failed during shutdown");
        }
        info!("status synchronizer stopped");
    }
}
