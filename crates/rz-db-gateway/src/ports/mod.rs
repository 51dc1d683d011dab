//! Ports for the gateway's driven side.

pub mod outbound;

pub use outbound::{ConnectionFactory, StoreConnection};
