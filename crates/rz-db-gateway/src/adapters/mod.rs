//! Concrete store adapters.

pub mod memory;

pub use memory::{MemoryConnection, MemoryStore, MemoryStoreStats};
