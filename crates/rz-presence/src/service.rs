//! Presence service wiring.
//!
//! Composes the registry, ban gate, synchronizer, sweeper and address
//! tracker over one store gateway, and owns the background tasks plus
//! their shutdown signal. This is the only type the server runtime needs
//! to hold.

use crate::config::PresenceConfig;
use crate::domain::decision::ConnectionDecision;
use crate::error::PresenceResult;
use crate::gate::BanGate;
use crate::ip_tracker::IpTracker;
use crate::registry::{PeerRegistry, RegistryStats};
use crate::sweeper::HousekeepingSweeper;
use crate::sync::{BatchSynchronizer, FlushOutcome};
use rz_db_gateway::{CircuitSnapshot, ConnectionFactory, DbResult, StoreGateway};
use rz_shared_types::{BanRecord, DeviceId, PeerStatus};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Operator-facing snapshot of the whole presence core.
#[derive(Debug, Clone, Copy)]
pub struct ServiceStats {
    pub peers: RegistryStats,
    pub breaker: CircuitSnapshot,
    pub tracked_addresses: usize,
}

/// The presence core: liveness tracking, ban enforcement and durable
/// synchronization behind one handle.
pub struct PresenceService<F: ConnectionFactory> {
    config: PresenceConfig,
    registry: Arc<PeerRegistry>,
    gateway: Arc<StoreGateway<F>>,
    gate: BanGate<F>,
    ip_tracker: Arc<IpTracker>,
    synchronizer: Arc<BatchSynchronizer<F>>,
    sweeper: Arc<HousekeepingSweeper>,
    shutdown_tx: watch::Sender<bool>,
}

impl<F: ConnectionFactory> PresenceService<F> {
    /// Wire up the presence core over `gateway`. Fails on an invalid
    /// configuration; nothing is spawned yet.
    pub fn new(gateway: StoreGateway<F>, config: PresenceConfig) -> PresenceResult<Self> {
        config.validate()?;
        let gateway = Arc::new(gateway);
        let registry = Arc::new(PeerRegistry::new(config.policy.clone()));
        let ip_tracker = Arc::new(IpTracker::new(config.ip_tracker.clone()));
        let synchronizer = Arc::new(BatchSynchronizer::new(
            Arc::clone(&registry),
            Arc::clone(&gateway),
            config.flush_interval,
        ));
        let sweeper = Arc::new(HousekeepingSweeper::new(
            Arc::clone(&registry),
            Arc::clone(&ip_tracker),
            config.sweep_interval,
            config.housekeeping_interval,
            config.offline_retention,
        ));
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            gate: BanGate::new(Arc::clone(&gateway)),
            config,
            registry,
            gateway,
            ip_tracker,
            synchronizer,
            sweeper,
            shutdown_tx,
        })
    }

    /// Record a liveness report. Never fails; durability follows on the
    /// next flush cycle.
    pub fn report_heartbeat(&self, device_id: &DeviceId, latency: Duration) {
        self.registry.report_heartbeat(device_id, latency);
    }

    /// Current status of a device, `None` if untracked.
    pub fn peer_status(&self, device_id: &DeviceId) -> Option<PeerStatus> {
        self.registry.status(device_id)
    }

    /// Fail-closed connection authorization for a source/target pair.
    pub async fn check_connection_allowed(
        &self,
        source: &DeviceId,
        target: &DeviceId,
    ) -> ConnectionDecision {
        self.gate.check_connection_allowed(source, target).await
    }

    /// Record a registration attempt from `ip`; false means the address
    /// is over its limits and the attempt should be rejected.
    pub fn register_attempt(&self, ip: IpAddr, device_id: &DeviceId) -> bool {
        self.ip_tracker.note_attempt(ip, device_id)
    }

    /// Persist a ban decision. Goes straight through the gateway so a new
    /// ban takes effect on the next connection check.
    pub async fn record_ban(&self, record: BanRecord) -> DbResult<()> {
        self.gateway.record_ban(record).await
    }

    /// Force one flush cycle, outside the periodic cadence.
    pub async fn flush_now(&self) -> FlushOutcome {
        self.synchronizer.flush_once().await
    }

    /// Point-in-time view across registry, breaker and address tracker.
    pub fn snapshot_statistics(&self) -> ServiceStats {
        ServiceStats {
            peers: self.registry.snapshot_statistics(),
            breaker: self.gateway.breaker_snapshot(),
            tracked_addresses: self.ip_tracker.tracked_addresses(),
        }
    }

    /// Spawn the sweeper, synchronizer and statistics logger. The handles
    /// complete after [`shutdown`](Self::shutdown) is called.
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(3);

        let sweeper = Arc::clone(&self.sweeper);
        let rx = self.shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move { sweeper.run(rx).await }));

        let synchronizer = Arc::clone(&self.synchronizer);
        let rx = self.shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move { synchronizer.run(rx).await }));

        let registry = Arc::clone(&self.registry);
        let gateway = Arc::clone(&self.gateway);
        let ip_tracker = Arc::clone(&self.ip_tracker);
        let interval = self.config.stats_log_interval;
        let mut rx = self.shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so the first log
            // line carries a full interval of data.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let peers = registry.snapshot_statistics();
                        let breaker = gateway.breaker_snapshot();
                        info!(
                            total = peers.total,
                            healthy = peers.healthy,
                            degraded = peers.degraded,
                            critical = peers.critical,
                            offline = peers.offline,
                            breaker = %breaker.state,
                            tracked_addresses = ip_tracker.tracked_addresses(),
                            "presence statistics"
                        );
                    }
                    result = rx.changed() => {
                        if result.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }));

        handles
    }

    /// Signal all background tasks to stop. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown_tx.send(true).ok();
    }
}
