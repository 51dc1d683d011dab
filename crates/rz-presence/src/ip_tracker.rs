//! Per-address registration tracking.
//!
//! Two sliding limits per source address: a short window capping raw
//! registration attempts, and a long window capping how many distinct
//! device identities one address may present. Both exist to slow down
//! credential scanning against the rendezvous endpoint. Entries are pruned
//! by the housekeeping sweeper once both windows lapse.

use dashmap::DashMap;
use rz_shared_types::DeviceId;
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Limits for per-address tracking.
#[derive(Debug, Clone)]
pub struct IpTrackerConfig {
    /// Attempts allowed per `attempt_window` from one address.
    pub max_attempts: u32,
    /// Length of the attempt-counting window.
    pub attempt_window: Duration,
    /// Distinct device identities allowed per `identity_window`.
    pub max_identities: usize,
    /// Length of the identity-counting window.
    pub identity_window: Duration,
}

impl Default for IpTrackerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            attempt_window: Duration::from_secs(60),
            max_identities: 3,
            identity_window: Duration::from_secs(86_400),
        }
    }
}

struct IpActivity {
    attempt_window_start: Instant,
    attempts: u32,
    identity_window_start: Instant,
    identities: HashSet<DeviceId>,
}

impl IpActivity {
    fn new(now: Instant) -> Self {
        Self {
            attempt_window_start: now,
            attempts: 0,
            identity_window_start: now,
            identities: HashSet::new(),
        }
    }
}

/// Tracks registration pressure per source address.
pub struct IpTracker {
    activity: DashMap<IpAddr, IpActivity>,
    config: IpTrackerConfig,
}

impl IpTracker {
    pub fn new(config: IpTrackerConfig) -> Self {
        Self {
            activity: DashMap::new(),
            config,
        }
    }

    /// Record a registration attempt from `ip` claiming `device_id`.
    /// Returns whether the attempt is within limits.
    pub fn note_attempt(&self, ip: IpAddr, device_id: &DeviceId) -> bool {
        let now = Instant::now();
        let mut entry = self
            .activity
            .entry(ip)
            .or_insert_with(|| IpActivity::new(now));

        if now.duration_since(entry.attempt_window_start) >= self.config.attempt_window {
            entry.attempt_window_start = now;
            entry.attempts = 0;
        }
        if now.duration_since(entry.identity_window_start) >= self.config.identity_window {
            entry.identity_window_start = now;
            entry.identities.clear();
        }

        entry.attempts += 1;
        if entry.attempts > self.config.max_attempts {
            warn!(%ip, attempts = entry.attempts, "address exceeded attempt limit");
            return false;
        }

        if !entry.identities.contains(device_id) {
            if entry.identities.len() >= self.config.max_identities {
                warn!(
                    %ip,
                    identities = entry.identities.len(),
                    device = %device_id,
                    "address exceeded identity limit"
                );
                return false;
            }
            entry.identities.insert(device_id.clone());
        }
        true
    }

    /// Drop addresses whose windows have both lapsed. Returns how many
    /// entries were removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.activity.len();
        self.activity.retain(|_, activity| {
            now.duration_since(activity.attempt_window_start) < self.config.attempt_window
                || now.duration_since(activity.identity_window_start)
                    < self.config.identity_window
        });
        before - self.activity.len()
    }

    pub fn tracked_addresses(&self) -> usize {
        self.activity.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([203, 0, 113, last])
    }

    fn device(name: &str) -> DeviceId {
        DeviceId::new(name)
    }

    fn tracker() -> IpTracker {
        IpTracker::new(IpTrackerConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_within_limit_allowed() {
        let tracker = tracker();
        for _ in 0..30 {
            assert!(tracker.note_attempt(ip(1), &device("a")));
        }
        assert!(!tracker.note_attempt(ip(1), &device("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_window_resets() {
        let tracker = tracker();
        for _ in 0..30 {
            tracker.note_attempt(ip(1), &device("a"));
        }
        assert!(!tracker.note_attempt(ip(1), &device("a")));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(tracker.note_attempt(ip(1), &device("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_addresses_tracked_independently() {
        let tracker = tracker();
        for _ in 0..31 {
            tracker.note_attempt(ip(1), &device("a"));
        }
        assert!(tracker.note_attempt(ip(2), &device("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_limit_per_address() {
        let tracker = tracker();
        assert!(tracker.note_attempt(ip(1), &device("a")));
        assert!(tracker.note_attempt(ip(1), &device("b")));
        assert!(tracker.note_attempt(ip(1), &device("c")));
        // Fourth distinct identity from the same address.
        assert!(!tracker.note_attempt(ip(1), &device("d")));
        // Known identities are still fine.
        assert!(tracker.note_attempt(ip(1), &device("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_drops_lapsed_entries() {
        let tracker = tracker();
        tracker.note_attempt(ip(1), &device("a"));
        assert_eq!(tracker.prune(), 0);
        assert_eq!(tracker.tracked_addresses(), 1);

        tokio::time::advance(Duration::from_secs(86_401)).await;
        assert_eq!(tracker.prune(), 1);
        assert_eq!(tracker.tracked_addresses(), 0);
    }
}
