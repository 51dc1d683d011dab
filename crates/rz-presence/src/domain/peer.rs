//! Per-peer liveness state machine.
//!
//! # State Machine
//!
//! ```text
//! [ONLINE] ──2 missed──► [DEGRADED] ──4 missed──► [CRITICAL]
//!     ▲                      │                        │
//!     │ heartbeat            │ heartbeat              │ offline timeout
//!     ◄──────────────────────┴────────────◄───────────┤
//!     │                                               ▼
//!     └────────────── heartbeat ─────────────── [OFFLINE]
//! ```
//!
//! `status` is never assigned directly; it is always the output of
//! [`classify`], a pure function of the missed-heartbeat count and the time
//! elapsed since the last heartbeat. Severity only increases while no
//! heartbeat arrives; a single heartbeat resets the peer to `Online` from
//! any state.

use rz_shared_types::PeerStatus;
use std::time::Duration;
use tokio::time::Instant;

/// Thresholds driving the per-peer status machine.
#[derive(Debug, Clone)]
pub struct LivenessPolicy {
    /// Interval at which each device is expected to report.
    pub heartbeat_interval: Duration,
    /// Elapsed silence after which a peer is `Offline`, independent of the
    /// missed-heartbeat count (a single very late heartbeat also counts).
    pub offline_timeout: Duration,
    /// Missed heartbeats at which a peer becomes `Degraded`.
    pub degraded_threshold: u32,
    /// Missed heartbeats at which a peer becomes `Critical`.
    pub critical_threshold: u32,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(3),
            offline_timeout: Duration::from_secs(15),
            degraded_threshold: 2,
            critical_threshold: 4,
        }
    }
}

impl LivenessPolicy {
    /// Missed heartbeats implied by `elapsed` silence: one per complete
    /// expected-report window.
    pub fn missed_after(&self, elapsed: Duration) -> u32 {
        if self.heartbeat_interval.is_zero() {
            return 0;
        }
        (elapsed.as_millis() / self.heartbeat_interval.as_millis()) as u32
    }
}

/// Compute a peer's status from its missed-heartbeat count and the time
/// since its last heartbeat. Pure; the only place status is decided.
pub fn classify(missed: u32, elapsed: Duration, policy: &LivenessPolicy) -> PeerStatus {
    if elapsed >= policy.offline_timeout {
        PeerStatus::Offline
    } else if missed >= policy.critical_threshold {
        PeerStatus::Critical
    } else if missed >= policy.degraded_threshold {
        PeerStatus::Degraded
    } else {
        PeerStatus::Online
    }
}

/// In-memory liveness state for one tracked device.
#[derive(Debug, Clone)]
pub struct Peer {
    /// Status as of the last heartbeat or sweep.
    pub status: PeerStatus,
    /// When the most recent heartbeat arrived.
    pub last_heartbeat_at: Instant,
    /// Consecutive missed heartbeats since the last report.
    pub missed_heartbeats: u32,
    /// Lifetime heartbeat count, diagnostics only.
    pub total_heartbeats: u64,
    /// Round-trip latency of the last heartbeat, diagnostics only.
    pub last_response_latency: Duration,
    /// True when in-memory state has changed since the last durable flush.
    pub dirty: bool,
}

impl Peer {
    /// A peer first seen at `now`; `record_heartbeat` follows immediately.
    pub fn new(now: Instant) -> Self {
        Self {
            status: PeerStatus::Online,
            last_heartbeat_at: now,
            missed_heartbeats: 0,
            total_heartbeats: 0,
            last_response_latency: Duration::ZERO,
            dirty: false,
        }
    }

    /// Apply a liveness report. Resets the missed count, recomputes status
    /// and marks the peer dirty for the next flush.
    pub fn record_heartbeat(&mut self, now: Instant, latency: Duration, policy: &LivenessPolicy) {
        self.missed_heartbeats = 0;
        self.last_heartbeat_at = now;
        self.total_heartbeats += 1;
        self.last_response_latency = latency;
        self.status = classify(0, Duration::ZERO, policy);
        self.dirty = true;
    }

    /// Periodic sweep step: account for expected-but-unreported heartbeats
    /// and recompute status. Marks dirty only on an actual status change so
    /// silent peers do not inflate write volume. Returns whether the status
    /// changed.
    pub fn tick(&mut self, now: Instant, policy: &LivenessPolicy) -> bool {
        let elapsed = now.duration_since(self.last_heartbeat_at);
        let missed = policy.missed_after(elapsed);
        if missed > self.missed_heartbeats {
            self.missed_heartbeats = missed;
        }
        let next = classify(self.missed_heartbeats, elapsed, policy);
        if next != self.status {
            self.status = next;
            self.dirty = true;
            true
        } else {
            false
        }
    }

    /// Status as of `now`, without mutating anything. Equivalent to what a
    /// sweep at `now` would compute.
    pub fn current_status(&self, now: Instant, policy: &LivenessPolicy) -> PeerStatus {
        let elapsed = now.duration_since(self.last_heartbeat_at);
        let missed = self.missed_heartbeats.max(policy.missed_after(elapsed));
        classify(missed, elapsed, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> LivenessPolicy {
        LivenessPolicy::default()
    }

    #[test]
    fn test_classify_thresholds() {
        let p = policy();
        let t = Duration::from_secs(1);
        assert_eq!(classify(0, t, &p), PeerStatus::Online);
        assert_eq!(classify(1, t, &p), PeerStatus::Online);
        assert_eq!(classify(2, t, &p), PeerStatus::Degraded);
        assert_eq!(classify(3, t, &p), PeerStatus::Degraded);
        assert_eq!(classify(4, t, &p), PeerStatus::Critical);
        assert_eq!(classify(10, t, &p), PeerStatus::Critical);
    }

    #[test]
    fn test_offline_overrides_missed_count() {
        let p = policy();
        // Even with zero recorded misses, long silence means offline.
        assert_eq!(classify(0, Duration::from_secs(15), &p), PeerStatus::Offline);
        assert_eq!(classify(9, Duration::from_secs(20), &p), PeerStatus::Offline);
    }

    #[test]
    fn test_severity_monotonic_in_silence() {
        let p = policy();
        let mut last = PeerStatus::Online;
        for secs in 0..30 {
            let elapsed = Duration::from_secs(secs);
            let status = classify(p.missed_after(elapsed), elapsed, &p);
            assert!(status >= last, "severity decreased at t={secs}s");
            last = status;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_resets_from_any_state() {
        let p = policy();
        let mut peer = Peer::new(Instant::now());
        peer.record_heartbeat(Instant::now(), Duration::from_millis(5), &p);

        tokio::time::advance(Duration::from_secs(20)).await;
        peer.tick(Instant::now(), &p);
        assert_eq!(peer.status, PeerStatus::Offline);

        peer.record_heartbeat(Instant::now(), Duration::from_millis(5), &p);
        assert_eq!(peer.status, PeerStatus::Online);
        assert_eq!(peer.missed_heartbeats, 0);
        assert!(peer.dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_marks_dirty_only_on_change() {
        let p = policy();
        let mut peer = Peer::new(Instant::now());
        peer.record_heartbeat(Instant::now(), Duration::ZERO, &p);
        peer.dirty = false;

        // One missed window: still online, nothing to persist.
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!peer.tick(Instant::now(), &p));
        assert!(!peer.dirty);

        // Second missed window: degraded, persist it.
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(peer.tick(Instant::now(), &p));
        assert!(peer.dirty);

        // Sweeping again without further decay stays clean.
        peer.dirty = false;
        assert!(!peer.tick(Instant::now(), &p));
        assert!(!peer.dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_status_matches_tick() {
        let p = policy();
        let mut peer = Peer::new(Instant::now());
        peer.record_heartbeat(Instant::now(), Duration::ZERO, &p);

        for _ in 0..8 {
            tokio::time::advance(Duration::from_secs(3)).await;
            let read = peer.current_status(Instant::now(), &p);
            peer.tick(Instant::now(), &p);
            assert_eq!(read, peer.status);
        }
    }
}
