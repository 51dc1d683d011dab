//! Connection-authorization decisions.

use serde::Serialize;

/// Why a connection attempt was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The requesting device is banned.
    SourceBanned,
    /// The requested device is banned.
    TargetBanned,
    /// The ban list could not be consulted. Denying on uncertainty is the
    /// point: allowing connections during a persistence outage is a larger
    /// security risk than blocking them.
    StoreUnavailable,
}

/// Outcome of a connection-authorization query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionDecision {
    /// Neither endpoint is banned; the rendezvous may proceed.
    Allowed,
    /// The connection must not be brokered.
    Denied(DenyReason),
}

impl ConnectionDecision {
    /// Whether the rendezvous may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, ConnectionDecision::Allowed)
    }
}
