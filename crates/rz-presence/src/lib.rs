//! # Presence Core
//!
//! Liveness tracking, ban enforcement and durable synchronization for a
//! rendezvous server. Memory is authoritative for liveness; the durable
//! store receives asynchronous batched snapshots and is consulted
//! synchronously only for ban decisions, which fail closed.
//!
//! # Architecture
//!
//! ```text
//!                         ┌────────────────────┐
//!    heartbeats ─────────►│    PeerRegistry    │◄───── status queries
//!                         │  (DashMap, dirty   │
//!                         │   flags per peer)  │
//!                         └─────┬────────▲─────┘
//!                    drain_dirty│        │remark_dirty on failure
//!                         ┌─────▼────────┴─────┐
//!    sweeper ────────────►│ BatchSynchronizer  │
//!    (status decay,       └─────────┬──────────┘
//!     eviction, pruning)            │ one batch per cycle
//!                         ┌─────────▼──────────┐
//!    ban checks ─────────►│    StoreGateway    │────► durable store
//!    (fail closed)        │ (pool + retry +    │
//!                         │  circuit breaker)  │
//!                         └────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rz_db_gateway::{GatewayConfig, MemoryStore, StoreGateway};
//! use rz_presence::{PresenceConfig, PresenceService};
//! use rz_shared_types::DeviceId;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = StoreGateway::new(MemoryStore::new(), GatewayConfig::from_env());
//! let service = PresenceService::new(gateway, PresenceConfig::from_env())?;
//! let tasks = service.spawn_background_tasks();
//!
//! service.report_heartbeat(&DeviceId::new("dev-1"), Duration::from_millis(12));
//! let decision = service
//!     .check_connection_allowed(&DeviceId::new("dev-1"), &DeviceId::new("dev-2"))
//!     .await;
//! assert!(decision.is_allowed());
//!
//! service.shutdown();
//! for task in tasks {
//!     task.await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod gate;
pub mod ip_tracker;
pub mod registry;
pub mod service;
pub mod sweeper;
pub mod sync;

pub use config::PresenceConfig;
pub use domain::decision::{ConnectionDecision, DenyReason};
pub use domain::peer::{classify, LivenessPolicy, Peer};
pub use error::{PresenceError, PresenceResult};
pub use gate::BanGate;
pub use ip_tracker::{IpTracker, IpTrackerConfig};
pub use registry::{PeerRegistry, RegistryStats};
pub use service::{PresenceService, ServiceStats};
pub use sweeper::{HousekeepingSweeper, SweepReport};
pub use sync::{BatchSynchronizer, FlushOutcome};
