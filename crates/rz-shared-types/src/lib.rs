//! # rz-shared-types
//!
//! Data-model types shared across the rendezvous presence core.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary
//!   (device identifiers, peer status, pending writes, ban records) is
//!   defined here.
//! - **Identity joins, not object joins**: the registry, the pending-write
//!   batches and the ban table all key on [`DeviceId`]; they never hold
//!   references into each other since their lifetimes differ.

pub mod entities;

pub use entities::{BanRecord, DeviceId, PeerStatus, StatusUpdate};
