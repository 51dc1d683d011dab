//! Error types for the presence core.
//!
//! Deliberately small: heartbeat reporting and status queries never fail
//! visibly (persistence trouble degrades to delayed durability), and the ban
//! gate converts gateway errors into denials. What remains is configuration
//! validation.

use thiserror::Error;

/// Presence core errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PresenceError {
    /// A configured duration must be non-zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    /// Threshold ordering violated.
    #[error("degraded threshold {degraded} must be below critical threshold {critical}")]
    ThresholdOrder { degraded: u32, critical: u32 },

    /// The offline timeout must exceed the heartbeat interval, otherwise
    /// every peer flaps offline between beats.
    #[error("offline timeout {timeout_secs}s must exceed heartbeat interval {interval_secs}s")]
    TimeoutTooShort { timeout_secs: u64, interval_secs: u64 },
}

/// Result type for presence operations.
pub type PresenceResult<T> = Result<T, PresenceError>;
