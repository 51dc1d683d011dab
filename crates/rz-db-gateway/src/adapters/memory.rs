//! In-memory store adapter.
//!
//! Backs the gateway with plain maps. Used by the test suites across the
//! workspace and by embedded deployments that do not need durability.
//! Supports failure injection so resilience paths (retry, breaker,
//! fail-closed ban checks) can be exercised deterministically.

use crate::error::{DbError, DbResult};
use crate::ports::{ConnectionFactory, StoreConnection};
use async_trait::async_trait;
use parking_lot::Mutex;
use rz_shared_types::{BanRecord, DeviceId, PeerStatus, StatusUpdate};
use std::collections::HashMap;
use std::sync::Arc;

/// Counters exposed for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    /// Connections dialed by the factory.
    pub connects: u64,
    /// Individual store operations executed.
    pub ops: u64,
    /// Liveness rows written.
    pub status_writes: u64,
    /// Ban rows read.
    pub ban_reads: u64,
}

#[derive(Default)]
struct MemoryState {
    statuses: HashMap<DeviceId, StatusUpdate>,
    bans: HashMap<DeviceId, BanRecord>,
    stats: MemoryStoreStats,
    /// Number of upcoming operations that fail with a connection error.
    fail_next_ops: u32,
    /// Number of upcoming dials that fail.
    fail_next_connects: u32,
    /// While set, every operation fails with a connection error.
    unavailable: bool,
}

impl MemoryState {
    fn check_op(&mut self) -> DbResult<()> {
        self.stats.ops += 1;
        if self.unavailable {
            return Err(DbError::connection("store unavailable (injected)"));
        }
        if self.fail_next_ops > 0 {
            self.fail_next_ops -= 1;
            return Err(DbError::connection("transient failure (injected)"));
        }
        Ok(())
    }
}

/// Shared in-memory store; cloning yields another handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` store operations with a connection error.
    pub fn fail_next_ops(&self, n: u32) {
        self.state.lock().fail_next_ops = n;
    }

    /// Fail the next `n` connection dials.
    pub fn fail_connects(&self, n: u32) {
        self.state.lock().fail_next_connects = n;
    }

    /// Toggle a persistent outage: every operation fails until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Last persisted status for a device, if any.
    pub fn status_of(&self, device: &DeviceId) -> Option<PeerStatus> {
        self.state.lock().statuses.get(device).map(|u| u.status)
    }

    /// Ban record for a device, if any.
    pub fn ban_of(&self, device: &DeviceId) -> Option<BanRecord> {
        self.state.lock().bans.get(device).cloned()
    }

    /// Seed a ban record directly, bypassing the gateway.
    pub fn seed_ban(&self, record: BanRecord) {
        self.state
            .lock()
            .bans
            .insert(record.device_id.clone(), record);
    }

    /// Counters for assertions.
    pub fn stats(&self) -> MemoryStoreStats {
        self.state.lock().stats
    }

    /// Number of persisted liveness rows.
    pub fn status_count(&self) -> usize {
        self.state.lock().statuses.len()
    }
}

/// A "connection" to the in-memory store.
pub struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn ping(&mut self) -> DbResult<()> {
        self.state.lock().check_op()
    }

    async fn fetch_ban(&mut self, device: &DeviceId) -> DbResult<Option<BanRecord>> {
        let mut state = self.state.lock();
        state.check_op()?;
        state.stats.ban_reads += 1;
        Ok(state.bans.get(device).cloned())
    }

    async fn upsert_ban(&mut self, record: &BanRecord) -> DbResult<()> {
        let mut state = self.state.lock();
        state.check_op()?;
        state.bans.insert(record.device_id.clone(), record.clone());
        Ok(())
    }

    async fn write_status(&mut self, update: &StatusUpdate) -> DbResult<()> {
        let mut state = self.state.lock();
        state.check_op()?;
        state.stats.status_writes += 1;
        state
            .statuses
            .insert(update.device_id.clone(), update.clone());
        Ok(())
    }

    async fn fetch_status(&mut self, device: &DeviceId) -> DbResult<Option<StatusUpdate>> {
        let mut state = self.state.lock();
        state.check_op()?;
        Ok(state.statuses.get(device).cloned())
    }
}

#[async_trait]
impl ConnectionFactory for MemoryStore {
    type Conn = MemoryConnection;

    async fn connect(&self) -> DbResult<MemoryConnection> {
        let mut state = self.state.lock();
        state.stats.connects += 1;
        if state.fail_next_connects > 0 {
            state.fail_next_connects -= 1;
            return Err(DbError::connection("dial failed (injected)"));
        }
        Ok(MemoryConnection {
            state: Arc::clone(&self.state),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_round_trip() {
        let store = MemoryStore::new();
        let mut conn = store.connect().await.unwrap();
        let device = DeviceId::new("dev-1");

        assert!(conn.fetch_status(&device).await.unwrap().is_none());
        conn.write_status(&StatusUpdate::now(device.clone(), PeerStatus::Online))
            .await
            .unwrap();
        assert_eq!(store.status_of(&device), Some(PeerStatus::Online));
    }

    #[tokio::test]
    async fn test_ban_round_trip() {
        let store = MemoryStore::new();
        let mut conn = store.connect().await.unwrap();
        let device = DeviceId::new("dev-1");

        conn.upsert_ban(&BanRecord::banned(device.clone(), "abuse"))
            .await
            .unwrap();
        let record = conn.fetch_ban(&device).await.unwrap().unwrap();
        assert!(record.is_banned);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryStore::new();
        let mut conn = store.connect().await.unwrap();
        store.fail_next_ops(1);

        assert!(conn.ping().await.is_err());
        assert!(conn.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_outage_fails_everything_until_cleared() {
        let store = MemoryStore::new();
        let mut conn = store.connect().await.unwrap();
        store.set_unavailable(true);
        assert!(conn.ping().await.is_err());
        assert!(conn.ping().await.is_err());
        store.set_unavailable(false);
        assert!(conn.ping().await.is_ok());
    }
}
