//! Presence core configuration.
//!
//! Values only; loading mechanism belongs to the server runtime. `from_env`
//! honors the environment variables the deployed servers already use
//! (`HEARTBEAT_INTERVAL_SECS`, `PEER_TIMEOUT_SECS`).

use crate::domain::peer::LivenessPolicy;
use crate::error::{PresenceError, PresenceResult};
use crate::ip_tracker::IpTrackerConfig;
use std::time::Duration;

/// Configuration for the presence core and its background tasks.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Per-peer status thresholds.
    pub policy: LivenessPolicy,
    /// How long an `Offline` peer stays in the registry before eviction.
    pub offline_retention: Duration,
    /// Cadence of the status sweep; defaults to the heartbeat interval.
    pub sweep_interval: Duration,
    /// Cadence of eviction and auxiliary-structure pruning.
    pub housekeeping_interval: Duration,
    /// Cadence of batched durable flushes.
    pub flush_interval: Duration,
    /// Cadence of the operator statistics log line.
    pub stats_log_interval: Duration,
    /// Per-address registration tracking limits.
    pub ip_tracker: IpTrackerConfig,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        let policy = LivenessPolicy::default();
        Self {
            sweep_interval: policy.heartbeat_interval,
            policy,
            offline_retention: Duration::from_secs(300),
            housekeeping_interval: Duration::from_secs(300),
            flush_interval: Duration::from_secs(5),
            stats_log_interval: Duration::from_secs(60),
            ip_tracker: IpTrackerConfig::default(),
        }
    }
}

impl PresenceConfig {
    /// Build a config from defaults overridden by environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = read_env_u64("HEARTBEAT_INTERVAL_SECS") {
            config.policy.heartbeat_interval = Duration::from_secs(secs.max(1));
            config.sweep_interval = config.policy.heartbeat_interval;
        }
        if let Some(secs) = read_env_u64("PEER_TIMEOUT_SECS") {
            config.policy.offline_timeout = Duration::from_secs(secs.max(1));
        }
        config
    }

    /// Validate threshold ordering and durations.
    pub fn validate(&self) -> PresenceResult<()> {
        if self.policy.heartbeat_interval.is_zero() {
            return Err(PresenceError::ZeroDuration {
                field: "heartbeat_interval",
            });
        }
        if self.sweep_interval.is_zero() {
            return Err(PresenceError::ZeroDuration {
                field: "sweep_interval",
            });
        }
        if self.flush_interval.is_zero() {
            return Err(PresenceError::ZeroDuration {
                field: "flush_interval",
            });
        }
        if self.policy.degraded_threshold >= self.policy.critical_threshold {
            return Err(PresenceError::ThresholdOrder {
                degraded: self.policy.degraded_threshold,
                critical: self.policy.critical_threshold,
            });
        }
        if self.policy.offline_timeout <= self.policy.heartbeat_interval {
            return Err(PresenceError::TimeoutTooShort {
                timeout_secs: self.policy.offline_timeout.as_secs(),
                interval_secs: self.policy.heartbeat_interval.as_secs(),
            });
        }
        Ok(())
    }
}

fn read_env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok())
}
