//! Bounded pool of reusable store connections.
//!
//! Capacity is a hard limit: checkout waits (with a timeout) for a free
//! slot instead of opening extra connections. Connections are created
//! lazily on first use and recycled through an idle list; a connection
//! marked broken is dropped and its slot re-opened, so the next checkout
//! dials a replacement.

use crate::error::{DbError, DbResult};
use crate::ports::ConnectionFactory;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Fixed-capacity connection pool.
pub struct ConnectionPool<F: ConnectionFactory> {
    factory: F,
    capacity: Arc<Semaphore>,
    idle: Mutex<Vec<F::Conn>>,
    checkout_timeout: Duration,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create a pool of at most `size` connections.
    pub fn new(factory: F, size: usize, checkout_timeout: Duration) -> Self {
        Self {
            factory,
            capacity: Arc::new(Semaphore::new(size.max(1))),
            idle: Mutex::new(Vec::new()),
            checkout_timeout,
        }
    }

    /// Check out a connection, waiting up to the checkout timeout for a
    /// free slot. Fails with `PoolExhausted` when the wait times out and
    /// `Connection` when dialing a replacement connection fails.
    pub async fn checkout(&self) -> DbResult<PooledConnection<'_, F>> {
        let started = Instant::now();
        let permit = match tokio::time::timeout(self.checkout_timeout, self.capacity.acquire())
            .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                // The semaphore is never closed while the pool is alive.
                return Err(DbError::connection("pool shut down"));
            }
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(waited_ms, "no pooled connection became free");
                return Err(DbError::PoolExhausted { waited_ms });
            }
        };

        let reused = self.idle.lock().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                debug!("dialing new store connection");
                // Permit is dropped on error, releasing the slot.
                self.factory.connect().await?
            }
        };

        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
            broken: false,
            _permit: permit,
        })
    }

    /// Number of idle connections currently parked in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, conn: F::Conn) {
        self.idle.lock().push(conn);
    }
}

/// A checked-out connection; returns itself to the pool on drop unless
/// marked broken.
pub struct PooledConnection<'a, F: ConnectionFactory> {
    pool: &'a ConnectionPool<F>,
    conn: Option<F::Conn>,
    broken: bool,
    _permit: SemaphorePermit<'a>,
}

impl<F: ConnectionFactory> PooledConnection<'_, F> {
    /// Mark the connection broken; it will be discarded instead of reused.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<'_, F> {
    type Target = F::Conn;

    fn deref(&self) -> &F::Conn {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<'_, F> {
    fn deref_mut(&mut self) -> &mut F::Conn {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<'_, F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.broken {
                debug!("discarding broken store connection");
            } else {
                self.pool.release(conn);
            }
        }
        // _permit drops here, freeing the capacity slot either way.
    }
}
