//! Gateway configuration.
//!
//! Values only; the mechanism that loads them (flags, files) belongs to the
//! server runtime. `from_env` honors the environment variables the deployed
//! servers already use.

use crate::domain::circuit_breaker::CircuitBreakerConfig;
use std::time::Duration;

/// Configuration for the durable-store gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Number of pooled store connections. Hard capacity bound; checkout
    /// blocks (with timeout) rather than growing past it.
    pub pool_size: usize,
    /// Maximum wait for a free pooled connection before `PoolExhausted`.
    pub checkout_timeout: Duration,
    /// Total attempts for a transient failure (first call + retries).
    pub max_attempts: u32,
    /// Backoff before the first retry; doubles on each further attempt.
    pub retry_backoff: Duration,
    /// Circuit breaker thresholds.
    pub breaker: CircuitBreakerConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            checkout_timeout: Duration::from_secs(2),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(100),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Build a config from defaults overridden by environment variables.
    ///
    /// `MAX_DATABASE_CONNECTIONS` sets the pool size (clamped to at least 1);
    /// unparsable values fall back to the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = read_env_u64("MAX_DATABASE_CONNECTIONS") {
            config.pool_size = (n as usize).max(1);
        }
        if let Some(ms) = read_env_u64("DB_CHECKOUT_TIMEOUT_MS") {
            config.checkout_timeout = Duration::from_millis(ms);
        }
        config
    }

    /// Upper bound on the time one `execute` call can block: pool wait plus
    /// the full retry/backoff budget. Callers treat expiry like any other
    /// `DbError`.
    pub fn call_deadline(&self) -> Duration {
        let mut backoff_total = Duration::ZERO;
        let mut step = self.retry_backoff;
        for _ in 1..self.max_attempts {
            backoff_total += step;
            step *= 2;
        }
        self.checkout_timeout * self.max_attempts + backoff_total
    }
}

fn read_env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok())
}
