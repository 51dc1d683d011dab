//! Error taxonomy for durable-store access.
//!
//! The gateway is the only component that classifies raw store failures;
//! callers above it see exactly these variants and nothing rawer.

use thiserror::Error;

/// Durable-store access errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DbError {
    /// Transient transport-level failure; the gateway retries these.
    #[error("store connection failed: {reason}")]
    Connection { reason: String },

    /// No pooled connection became free within the checkout timeout.
    /// Retryable by the caller on its next tick; never retried inline.
    #[error("connection pool exhausted after waiting {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    /// The circuit breaker is open; no call was attempted.
    #[error("circuit open, store presumed down; retry in {retry_after_ms}ms")]
    CircuitOpen { retry_after_ms: u64 },

    /// Every retry attempt failed with a transient error.
    #[error("store unreachable after {attempts} attempts: {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: String },

    /// Non-transient failure (bad statement, constraint violation).
    /// Never retried.
    #[error("query failed: {reason}")]
    Query { reason: String },
}

impl DbError {
    /// Build a transient connection error.
    pub fn connection(reason: impl Into<String>) -> Self {
        DbError::Connection {
            reason: reason.into(),
        }
    }

    /// Build a non-transient query error.
    pub fn query(reason: impl Into<String>) -> Self {
        DbError::Query {
            reason: reason.into(),
        }
    }

    /// Whether the gateway's inline retry loop may retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Connection { .. })
    }

    /// Whether this failure is evidence the store itself is unhealthy.
    ///
    /// Pool exhaustion is local capacity pressure and circuit-open means no
    /// call was made, so neither feeds the breaker's failure counter.
    pub fn indicates_store_failure(&self) -> bool {
        matches!(
            self,
            DbError::Connection { .. } | DbError::ExhaustedRetries { .. }
        )
    }
}

/// Result type for durable-store operations.
pub type DbResult<T> = Result<T, DbError>;
