//! Core domain entities for the presence core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Opaque device identifier.
///
/// Handed to this core by the wire-protocol layer after it has authenticated
/// the device; the core never inspects the contents. Equality and hashing are
/// byte-wise on the underlying string.
///
/// Ban decisions key strictly on `DeviceId`, never on network address:
/// multiple legitimate devices may share one address behind NAT, and an
/// address-keyed ban would collaterally block unrelated devices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device id from its wire representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Liveness status of a tracked peer.
///
/// Severity is strictly ordered: `Online < Degraded < Critical < Offline`.
/// The derived `Ord` relies on variant declaration order; tests pin it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerStatus {
    /// 0–1 missed heartbeats; the peer is healthy.
    Online,
    /// 2–3 missed heartbeats; the connection is flaky.
    Degraded,
    /// 4 or more missed heartbeats, but not yet past the hard timeout.
    Critical,
    /// No heartbeat for longer than the offline timeout.
    Offline,
}

impl PeerStatus {
    /// Whether the peer still counts as reachable for match-making purposes.
    pub fn is_reachable(&self) -> bool {
        !matches!(self, PeerStatus::Offline)
    }
}

impl fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerStatus::Online => "online",
            PeerStatus::Degraded => "degraded",
            PeerStatus::Critical => "critical",
            PeerStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// One queued durable state transition, awaiting a batched flush.
///
/// Produced by draining the registry's dirty peers; consumed by the batch
/// synchronizer. Re-marked dirty (not dropped) if the flush fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Device this transition belongs to.
    pub device_id: DeviceId,
    /// Status to persist.
    pub status: PeerStatus,
    /// Wall-clock time the transition was observed.
    pub observed_at: SystemTime,
}

impl StatusUpdate {
    /// Create an update stamped with the current wall-clock time.
    pub fn now(device_id: DeviceId, status: PeerStatus) -> Self {
        Self {
            device_id,
            status,
            observed_at: SystemTime::now(),
        }
    }
}

/// Durable ban decision for a device.
///
/// Read-mostly: written rarely by administrative action, read on every
/// connection-authorization query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    /// Device the decision applies to.
    pub device_id: DeviceId,
    /// Whether the device is currently banned.
    pub is_banned: bool,
    /// Operator-supplied reason, if any.
    pub reason: Option<String>,
    /// Last time the record was written.
    pub updated_at: SystemTime,
}

impl BanRecord {
    /// Create an active ban for `device_id`.
    pub fn banned(device_id: DeviceId, reason: impl Into<String>) -> Self {
        Self {
            device_id,
            is_banned: true,
            reason: Some(reason.into()),
            updated_at: SystemTime::now(),
        }
    }

    /// Create a record lifting any ban on `device_id`.
    pub fn lifted(device_id: DeviceId) -> Self {
        Self {
            device_id,
            is_banned: false,
            reason: None,
            updated_at: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_round_trip() {
        let id = DeviceId::new("ABC123");
        assert_eq!(id.as_str(), "ABC123");
        assert_eq!(id.to_string(), "ABC123");
        assert_eq!(DeviceId::from("ABC123"), id);
    }

    #[test]
    fn test_status_severity_ordering() {
        // Severity must be monotonic in variant order.
        assert!(PeerStatus::Online < PeerStatus::Degraded);
        assert!(PeerStatus::Degraded < PeerStatus::Critical);
        assert!(PeerStatus::Critical < PeerStatus::Offline);
    }

    #[test]
    fn test_status_reachability() {
        assert!(PeerStatus::Online.is_reachable());
        assert!(PeerStatus::Critical.is_reachable());
        assert!(!PeerStatus::Offline.is_reachable());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&PeerStatus::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }

    #[test]
    fn test_ban_record_constructors() {
        let ban = BanRecord::banned(DeviceId::new("dev-1"), "abuse");
        assert!(ban.is_banned);
        assert_eq!(ban.reason.as_deref(), Some("abuse"));

        let lifted = BanRecord::lifted(DeviceId::new("dev-1"));
        assert!(!lifted.is_banned);
        assert!(lifted.reason.is_none());
    }
}
