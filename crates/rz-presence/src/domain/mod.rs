//! Pure domain logic for the presence core.

pub mod decision;
pub mod peer;

pub use decision::{ConnectionDecision, DenyReason};
pub use peer::{classify, LivenessPolicy, Peer};
