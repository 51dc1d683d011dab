//! # rz-db-gateway
//!
//! Fault-tolerant access to the durable store: the one place in the system
//! that talks to the database, and the one place raw store failures are
//! classified.
//!
//! ## Overview
//!
//! This crate provides:
//! - **Bounded connection pool**: checkout blocks with a timeout instead of
//!   growing past the configured capacity
//! - **Retry with backoff**: transient connection failures retried with a
//!   doubling delay before surfacing `ExhaustedRetries`
//! - **Circuit breaker**: a `Closed | Open | HalfOpen` state machine that
//!   fast-fails every call while the store is presumed down
//! - **Typed errors**: callers see only the [`DbError`] taxonomy
//!
//! ## Architecture
//!
//! ```text
//! Presence core ──execute/execute_batch──► StoreGateway
//!                                              │
//!                                    CircuitBreaker gate
//!                                              │
//!                                     ConnectionPool (N)
//!                                              │
//!                                 ConnectionFactory::connect
//!                                              │
//!                                       durable store
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use rz_db_gateway::{GatewayConfig, StoreGateway};
//! use rz_db_gateway::adapters::MemoryStore;
//!
//! let gateway = StoreGateway::new(MemoryStore::new(), GatewayConfig::default());
//! let banned = gateway.is_device_banned(&"ABC123".into()).await?;
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod pool;
pub mod ports;

pub use adapters::{MemoryConnection, MemoryStore, MemoryStoreStats};
pub use config::GatewayConfig;
pub use domain::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use error::{DbError, DbResult};
pub use gateway::StoreGateway;
pub use pool::{ConnectionPool, PooledConnection};
pub use ports::{ConnectionFactory, StoreConnection};
