//! The store gateway: pool + retry + circuit breaker behind one interface.
//!
//! Every durable-store call in the system goes through [`StoreGateway`].
//! A call checks out a pooled connection, runs the operation, and retries
//! transport-level failures with exponential backoff; the shared circuit
//! breaker short-circuits everything once the store looks dead. Callers
//! never block past the bounded deadline (pool wait + retry budget) and
//! always get a typed [`DbError`] instead of a hang or a panic.

use crate::config::GatewayConfig;
use crate::domain::circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
use crate::error::{DbError, DbResult};
use crate::pool::ConnectionPool;
use crate::ports::{ConnectionFactory, StoreConnection};
use futures::future::BoxFuture;
use rz_shared_types::{BanRecord, DeviceId, StatusUpdate};
use tracing::warn;

/// Fault-tolerant gateway to the durable store.
pub struct StoreGateway<F: ConnectionFactory> {
    pool: ConnectionPool<F>,
    breaker: CircuitBreaker,
    config: GatewayConfig,
}

impl<F: ConnectionFactory> StoreGateway<F> {
    /// Create a gateway over `factory` with the given limits.
    pub fn new(factory: F, config: GatewayConfig) -> Self {
        let pool = ConnectionPool::new(factory, config.pool_size, config.checkout_timeout);
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Self {
            pool,
            breaker,
            config,
        }
    }

    /// Run a single operation against a pooled connection.
    ///
    /// Transient connection failures are retried up to the configured
    /// attempt budget with doubling backoff; query errors and pool
    /// exhaustion surface immediately.
    pub async fn execute<T, Op>(&self, op: Op) -> DbResult<T>
    where
        T: Send,
        Op: for<'c> Fn(&'c mut F::Conn) -> BoxFuture<'c, DbResult<T>> + Send + Sync,
    {
        self.breaker.acquire()?;
        let result = self.call_with_retry(&op).await;
        self.settle(&result);
        result
    }

    /// Run a batch of operations on one checked-out connection.
    ///
    /// The whole batch counts as a single call toward the breaker and the
    /// retry budget; a transient failure anywhere retries the whole batch.
    /// Entries are still independent writes at the store, so a partial
    /// failure cannot corrupt rows already written.
    pub async fn execute_batch<T, Op>(&self, ops: &[Op]) -> DbResult<Vec<T>>
    where
        T: Send,
        Op: for<'c> Fn(&'c mut F::Conn) -> BoxFuture<'c, DbResult<T>> + Send + Sync,
    {
        if ops.is_empty() {
            return Ok(Vec::new());
        }
        self.breaker.acquire()?;
        let result = self.batch_with_retry(ops).await;
        self.settle(&result);
        result
    }

    /// Whether `device` is currently banned. Unknown devices are not banned.
    pub async fn is_device_banned(&self, device: &DeviceId) -> DbResult<bool> {
        let device = device.clone();
        self.execute(move |conn: &mut F::Conn| -> BoxFuture<'_, DbResult<bool>> {
            let device = device.clone();
            Box::pin(async move {
                let record = conn.fetch_ban(&device).await?;
                Ok(record.map(|r| r.is_banned).unwrap_or(false))
            })
        })
        .await
    }

    /// Persist an administrative ban decision.
    pub async fn record_ban(&self, record: BanRecord) -> DbResult<()> {
        self.execute(move |conn: &mut F::Conn| -> BoxFuture<'_, DbResult<()>> {
            let record = record.clone();
            Box::pin(async move { conn.upsert_ban(&record).await })
        })
        .await
    }

    /// Flush a set of liveness transitions as one batched call.
    pub async fn flush_status_updates(&self, updates: &[StatusUpdate]) -> DbResult<()> {
        let ops: Vec<_> = updates
            .iter()
            .cloned()
            .map(|update| {
                batch_op::<F::Conn, _, _>(move |conn| {
                    let update = update.clone();
                    Box::pin(async move { conn.write_status(&update).await })
                })
            })
            .collect();
        self.execute_batch(&ops).await.map(|_| ())
    }

    /// Last persisted liveness row for `device`.
    pub async fn fetch_status(&self, device: &DeviceId) -> DbResult<Option<StatusUpdate>> {
        let device = device.clone();
        self.execute(
            move |conn: &mut F::Conn| -> BoxFuture<'_, DbResult<Option<StatusUpdate>>> {
                let device = device.clone();
                Box::pin(async move { conn.fetch_status(&device).await })
            },
        )
        .await
    }

    /// Current breaker state, for operator statistics.
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Consecutive store failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.breaker.consecutive_failures()
    }

    /// Point-in-time breaker view, for health snapshots.
    pub fn breaker_snapshot(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }

    /// Upper bound on how long one call may block.
    pub fn call_deadline(&self) -> std::time::Duration {
        self.config.call_deadline()
    }

    /// Feed the call outcome back into the breaker.
    fn settle<T>(&self, result: &DbResult<T>) {
        match result {
            Ok(_) => self.breaker.on_success(),
            // A query error proves the store answered.
            Err(DbError::Query { .. }) => self.breaker.on_success(),
            Err(e) if e.indicates_store_failure() => self.breaker.on_failure(),
            // Pool exhaustion (or a late CircuitOpen) never reached the store.
            Err(_) => self.breaker.on_abort(),
        }
    }

    async fn call_with_retry<T, Op>(&self, op: &Op) -> DbResult<T>
    where
        T: Send,
        Op: for<'c> Fn(&'c mut F::Conn) -> BoxFuture<'c, DbResult<T>> + Send + Sync,
    {
        let mut attempt: u32 = 0;
        let mut backoff = self.config.retry_backoff;
        loop {
            attempt += 1;
            let failure = match self.call_once(op).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };
            if attempt >= self.config.max_attempts {
                return Err(DbError::ExhaustedRetries {
                    attempts: attempt,
                    last_error: failure.to_string(),
                });
            }
            warn!(
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %failure,
                "transient store failure, backing off"
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }

    async fn call_once<T, Op>(&self, op: &Op) -> DbResult<T>
    where
        T: Send,
        Op: for<'c> Fn(&'c mut F::Conn) -> BoxFuture<'c, DbResult<T>> + Send + Sync,
    {
        let mut conn = self.pool.checkout().await?;
        let result = op(&mut conn).await;
        if matches!(&result, Err(e) if e.is_retryable()) {
            conn.mark_broken();
        }
        result
    }

    async fn batch_with_retry<T, Op>(&self, ops: &[Op]) -> DbResult<Vec<T>>
    where
        T: Send,
        Op: for<'c> Fn(&'c mut F::Conn) -> BoxFuture<'c, DbResult<T>> + Send + Sync,
    {
        let mut attempt: u32 = 0;
        let mut backoff = self.config.retry_backoff;
        loop {
            attempt += 1;
            let failure = match self.batch_once(ops).await {
                Ok(values) => return Ok(values),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };
            if attempt >= self.config.max_attempts {
                return Err(DbError::ExhaustedRetries {
                    attempts: attempt,
                    last_error: failure.to_string(),
                });
            }
            warn!(
                attempt,
                batch_len = ops.len(),
                backoff_ms = backoff.as_millis() as u64,
                error = %failure,
                "transient store failure during batch, backing off"
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }

    async fn batch_once<T, Op>(&self, ops: &[Op]) -> DbResult<Vec<T>>
    where
        T: Send,
        Op: for<'c> Fn(&'c mut F::Conn) -> BoxFuture<'c, DbResult<T>> + Send + Sync,
    {
        let mut conn = self.pool.checkout().await?;
        let mut values = Vec::with_capacity(ops.len());
        for op in ops {
            match op(&mut conn).await {
                Ok(value) => values.push(value),
                Err(e) => {
                    if e.is_retryable() {
                        conn.mark_broken();
                    }
                    return Err(e);
                }
            }
        }
        Ok(values)
    }
}

/// Pin a batch closure to the connection-lifetime bound `execute_batch`
/// expects. Closures collected through `.map()` have no expected type at
/// the call site, so without this the higher-ranked signature is not
/// inferred.
fn batch_op<C, T, Op>(op: Op) -> Op
where
    Op: for<'c> Fn(&'c mut C) -> BoxFuture<'c, DbResult<T>> + Send + Sync,
{
    op
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::domain::circuit_breaker::CircuitBreakerConfig;
    use rz_shared_types::PeerStatus;
    use std::time::Duration;

    fn fast_config() -> GatewayConfig {
        GatewayConfig {
            pool_size: 2,
            checkout_timeout: Duration::from_millis(100),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(10),
            breaker: CircuitBreakerConfig {
                failure_threshold: 3,
                cool_down: Duration::from_millis(200),
            },
        }
    }

    fn gateway() -> (MemoryStore, StoreGateway<MemoryStore>) {
        let store = MemoryStore::new();
        let gateway = StoreGateway::new(store.clone(), fast_config());
        (store, gateway)
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let (store, gateway) = gateway();
        store.fail_next_ops(2);

        let banned = gateway.is_device_banned(&DeviceId::new("dev-1")).await;
        assert_eq!(banned, Ok(false));
        // 2 failed attempts + 1 success.
        assert_eq!(store.stats().ops, 3);
        // The retried call counts as one success toward the breaker.
        assert_eq!(gateway.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhaust_into_typed_error() {
        let (store, gateway) = gateway();
        store.fail_next_ops(10);

        match gateway.is_device_banned(&DeviceId::new("dev-1")).await {
            Err(DbError::ExhaustedRetries { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected ExhaustedRetries, got {other:?}"),
        }
        assert_eq!(gateway.consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_and_short_circuits() {
        let (store, gateway) = gateway();
        store.set_unavailable(true);

        for _ in 0..3 {
            let _ = gateway.is_device_banned(&DeviceId::new("dev-1")).await;
        }
        assert_eq!(gateway.breaker_state(), CircuitState::Open);

        let ops_before = store.stats().ops;
        match gateway.is_device_banned(&DeviceId::new("dev-1")).await {
            Err(DbError::CircuitOpen { .. }) => {}
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
        // No store attempt while open.
        assert_eq!(store.stats().ops, ops_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_recovers_after_cool_down() {
        let (store, gateway) = gateway();
        store.set_unavailable(true);
        for _ in 0..3 {
            let _ = gateway.is_device_banned(&DeviceId::new("dev-1")).await;
        }
        assert_eq!(gateway.breaker_state(), CircuitState::Open);

        store.set_unavailable(false);
        tokio::time::advance(Duration::from_millis(250)).await;

        assert_eq!(
            gateway.is_device_banned(&DeviceId::new("dev-1")).await,
            Ok(false)
        );
        assert_eq!(gateway.breaker_state(), CircuitState::Closed);
        assert_eq!(gateway.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_error_not_retried_and_not_counted() {
        let (store, gateway) = gateway();
        let ops_before = store.stats().ops;
        let result: DbResult<()> = gateway
            .execute(
                |_conn: &mut crate::adapters::MemoryConnection| -> BoxFuture<'_, DbResult<()>> {
                    Box::pin(async { Err(DbError::query("constraint violated")) })
                },
            )
            .await;
        assert!(matches!(result, Err(DbError::Query { .. })));
        assert_eq!(store.stats().ops, ops_before);
        assert_eq!(gateway.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_batch_writes_all_rows_in_one_call() {
        let (store, gateway) = gateway();
        let updates: Vec<StatusUpdate> = (0..4)
            .map(|i| StatusUpdate::now(DeviceId::new(format!("dev-{i}")), PeerStatus::Online))
            .collect();

        gateway.flush_status_updates(&updates).await.unwrap();
        assert_eq!(store.status_count(), 4);
        // One checkout for the whole batch: the first dial is the only one.
        assert_eq!(store.stats().connects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_failure_retries_whole_batch() {
        let (store, gateway) = gateway();
        // First two batch attempts hit transient failures; the third lands.
        store.fail_next_ops(2);
        let updates: Vec<StatusUpdate> = (0..4)
            .map(|i| StatusUpdate::now(DeviceId::new(format!("dev-{i}")), PeerStatus::Degraded))
            .collect();

        gateway.flush_status_updates(&updates).await.unwrap();
        // All four rows present despite the mid-batch failures.
        assert_eq!(store.status_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mapped_batch_ops_execute_in_order() {
        let (store, gateway) = gateway();
        store.seed_ban(BanRecord::banned(DeviceId::new("dev-1"), "abuse"));

        // Ops collected through .map() rather than passed inline.
        let devices = [DeviceId::new("dev-0"), DeviceId::new("dev-1")];
        let ops: Vec<_> = devices
            .iter()
            .cloned()
            .map(|device| {
                batch_op::<crate::adapters::MemoryConnection, _, _>(move |conn| {
                    let device = device.clone();
                    Box::pin(async move {
                        let record = conn.fetch_ban(&device).await?;
                        Ok(record.map(|r| r.is_banned).unwrap_or(false))
                    })
                })
            })
            .collect();

        let banned = gateway.execute_batch(&ops).await.unwrap();
        assert_eq!(banned, vec![false, true]);
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let (store, gateway) = gateway();
        gateway.flush_status_updates(&[]).await.unwrap();
        assert_eq!(store.stats().ops, 0);
        assert_eq!(store.stats().connects, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ban_write_and_read_back() {
        let (_store, gateway) = gateway();
        let device = DeviceId::new("dev-1");
        gateway
            .record_ban(BanRecord::banned(device.clone(), "abuse report"))
            .await
            .unwrap();
        assert_eq!(gateway.is_device_banned(&device).await, Ok(true));

        gateway
            .record_ban(BanRecord::lifted(device.clone()))
            .await
            .unwrap();
        assert_eq!(gateway.is_device_banned(&device).await, Ok(false));
    }
}
