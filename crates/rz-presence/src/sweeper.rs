//! Periodic housekeeping.
//!
//! Each tick re-evaluates peer statuses in memory. On a longer cadence the
//! sweeper also evicts long-offline peers and prunes lapsed address
//! tracking. It never touches the durable store; the synchronizer picks up
//! whatever the sweep marks dirty.

use crate::ip_tracker::IpTracker;
use crate::registry::PeerRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// What one sweep cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    /// Peers whose status changed this cycle.
    pub transitions: usize,
    /// Offline peers evicted; zero between deep cleans.
    pub evicted: usize,
    /// Address entries pruned; zero between deep cleans.
    pub addresses_pruned: usize,
}

/// Drives status sweeps and periodic eviction.
pub struct HousekeepingSweeper {
    registry: Arc<PeerRegistry>,
    ip_tracker: Arc<IpTracker>,
    sweep_interval: Duration,
    deep_clean_interval: Duration,
    offline_retention: Duration,
    last_deep_clean: Mutex<Instant>,
}

impl HousekeepingSweeper {
    pub fn new(
        registry: Arc<PeerRegistry>,
        ip_tracker: Arc<IpTracker>,
        sweep_interval: Duration,
        deep_clean_interval: Duration,
        offline_retention: Duration,
    ) -> Self {
        Self {
            registry,
            ip_tracker,
            sweep_interval,
            deep_clean_interval,
            offline_retention,
            last_deep_clean: Mutex::new(Instant::now()),
        }
    }

    /// Run one sweep cycle, including a deep clean when due.
    pub fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport {
            transitions: self.registry.sweep(),
            ..SweepReport::default()
        };

        let now = Instant::now();
        let due = {
            let mut last = self.last_deep_clean.lock();
            if now.duration_since(*last) >= self.deep_clean_interval {
                *last = now;
                true
            } else {
                false
            }
        };
        if due {
            report.evicted = self.registry.evict_stale(self.offline_retention);
            report.addresses_pruned = self.ip_tracker.prune();
            if report.evicted > 0 || report.addresses_pruned > 0 {
                info!(
                    evicted = report.evicted,
                    addresses_pruned = report.addresses_pruned,
                    "housekeeping deep clean"
                );
            }
        }

        if report.transitions > 0 {
            debug!(transitions = report.transitions, "status sweep");
        }
        report
    }

    /// Sweep loop; runs until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once();
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("housekeeping sweeper stopped");
    }
}
