//! Concurrent in-memory peer registry.
//!
//! The registry is the authoritative source for liveness; the durable store
//! only receives asynchronous status snapshots and is never read back into
//! memory. `DashMap` shards the peer table so heartbeats for different
//! devices proceed in parallel, while operations on the same device are
//! serialized by the shard lock.

use crate::domain::peer::{LivenessPolicy, Peer};
use dashmap::DashMap;
use rz_shared_types::{DeviceId, PeerStatus, StatusUpdate};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Point-in-time counts across the registry, for operator logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub critical: usize,
    pub offline: usize,
}

/// Concurrent map of tracked devices and their liveness state.
pub struct PeerRegistry {
    peers: DashMap<DeviceId, Peer>,
    policy: LivenessPolicy,
}

impl PeerRegistry {
    pub fn new(policy: LivenessPolicy) -> Self {
        Self {
            peers: DashMap::new(),
            policy,
        }
    }

    /// Record a liveness report for `device_id`, inserting it on first
    /// contact. The peer comes back `Online` from any prior state.
    pub fn report_heartbeat(&self, device_id: &DeviceId, latency: Duration) {
        let now = Instant::now();
        let mut entry = self
            .peers
            .entry(device_id.clone())
            .or_insert_with(|| Peer::new(now));
        entry.record_heartbeat(now, latency, &self.policy);
    }

    /// Current status of `device_id`, evaluated against the clock at call
    /// time rather than the last sweep. `None` for unknown devices.
    pub fn status(&self, device_id: &DeviceId) -> Option<PeerStatus> {
        let now = Instant::now();
        self.peers
            .get(device_id)
            .map(|peer| peer.current_status(now, &self.policy))
    }

    /// Re-evaluate every peer against the clock. Returns how many peers
    /// changed status.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut changed = 0;
        for mut entry in self.peers.iter_mut() {
            if entry.tick(now, &self.policy) {
                changed += 1;
                debug!(
                    device = %entry.key(),
                    status = %entry.status,
                    missed = entry.missed_heartbeats,
                    "peer status changed"
                );
            }
        }
        changed
    }

    /// Collect the peers whose state changed since the last flush, clearing
    /// their dirty flags. The caller owns durability from here; on failure it
    /// hands the updates back via [`remark_dirty`].
    pub fn drain_dirty(&self) -> Vec<StatusUpdate> {
        let mut updates = Vec::new();
        for mut entry in self.peers.iter_mut() {
            if entry.dirty {
                entry.dirty = false;
                updates.push(StatusUpdate::now(entry.key().clone(), entry.status));
            }
        }
        updates
    }

    /// Restore dirty flags after a failed flush so the next cycle retries.
    /// Devices that disappeared in the meantime are skipped.
    pub fn remark_dirty(&self, updates: &[StatusUpdate]) {
        for update in updates {
            if let Some(mut entry) = self.peers.get_mut(&update.device_id) {
                entry.dirty = true;
            }
        }
    }

    /// Drop peers that have been `Offline` for longer than `retention`
    /// beyond the offline timeout. Returns how many were removed.
    pub fn evict_stale(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let cutoff = self.policy.offline_timeout + retention;
        let before = self.peers.len();
        self.peers.retain(|_, peer| {
            peer.status != PeerStatus::Offline
                || now.duration_since(peer.last_heartbeat_at) < cutoff
        });
        before - self.peers.len()
    }

    /// Status counts at call time.
    pub fn snapshot_statistics(&self) -> RegistryStats {
        let now = Instant::now();
        let mut stats = RegistryStats::default();
        for entry in self.peers.iter() {
            stats.total += 1;
            match entry.current_status(now, &self.policy) {
                PeerStatus::Online => stats.healthy += 1,
                PeerStatus::Degraded => stats.degraded += 1,
                PeerStatus::Critical => stats.critical += 1,
                PeerStatus::Offline => stats.offline += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
