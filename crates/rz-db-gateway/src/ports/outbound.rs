//! Driven ports: the durable store behind the gateway.
//!
//! The concrete store (SQLite, Postgres, a test double) plugs in here. The
//! schema is an external contract; these traits only require point lookups
//! by device identifier and bulk status upserts, which any reasonable peer
//! table supports.

use crate::error::DbResult;
use async_trait::async_trait;
use rz_shared_types::{BanRecord, DeviceId, StatusUpdate};

/// One live connection to the durable store.
///
/// Owned exclusively by the gateway while checked out of the pool. A
/// connection that returns a transport-level error is discarded rather than
/// returned to the pool.
#[async_trait]
pub trait StoreConnection: Send {
    /// Cheap liveness check, used when recycling pooled connections.
    async fn ping(&mut self) -> DbResult<()>;

    /// Point lookup of a device's ban record. `None` means the device is
    /// unknown to the ban table (and therefore not banned).
    async fn fetch_ban(&mut self, device: &DeviceId) -> DbResult<Option<BanRecord>>;

    /// Write or replace a device's ban record (administrative action).
    async fn upsert_ban(&mut self, record: &BanRecord) -> DbResult<()>;

    /// Upsert one device's liveness row. Each row is independent: a failure
    /// here must not corrupt previously written rows.
    async fn write_status(&mut self, update: &StatusUpdate) -> DbResult<()>;

    /// Point lookup of a device's last persisted liveness row.
    async fn fetch_status(&mut self, device: &DeviceId) -> DbResult<Option<StatusUpdate>>;
}

/// Creates store connections for the pool.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Conn: StoreConnection;

    /// Open a fresh connection. Transport failures surface as
    /// `DbError::Connection` and flow through the gateway's retry loop.
    async fn connect(&self) -> DbResult<Self::Conn>;
}
