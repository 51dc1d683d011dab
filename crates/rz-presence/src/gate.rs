//! Fail-closed ban enforcement.
//!
//! Every brokered connection consults the durable ban list for both
//! endpoints. Any failure to read the list denies the connection: an
//! unreadable ban list and a ban are treated the same at the decision
//! boundary, and only the deny reason distinguishes them for operators.

use crate::domain::decision::{ConnectionDecision, DenyReason};
use rz_db_gateway::{ConnectionFactory, StoreGateway};
use rz_shared_types::DeviceId;
use std::sync::Arc;
use tracing::warn;

/// Connection-authorization gate over the durable ban list.
pub struct BanGate<F: ConnectionFactory> {
    gateway: Arc<StoreGateway<F>>,
}

impl<F: ConnectionFactory> BanGate<F> {
    pub fn new(gateway: Arc<StoreGateway<F>>) -> Self {
        Self { gateway }
    }

    /// Decide whether `source` may be connected to `target`. The source is
    /// checked first, so a denial names the requesting side when both are
    /// banned.
    pub async fn check_connection_allowed(
        &self,
        source: &DeviceId,
        target: &DeviceId,
    ) -> ConnectionDecision {
        match self.gateway.is_device_banned(source).await {
            Ok(true) => return ConnectionDecision::Denied(DenyReason::SourceBanned),
            Ok(false) => {}
            Err(error) => {
                warn!(device = %source, %error, "ban check failed, denying connection");
                return ConnectionDecision::Denied(DenyReason::StoreUnavailable);
            }
        }
        match self.gateway.is_device_banned(target).await {
            Ok(true) => ConnectionDecision::Denied(DenyReason::TargetBanned),
            Ok(false) => ConnectionDecision::Allowed,
            Err(error) => {
                warn!(device = %target, %error, "ban check failed, denying connection");
                ConnectionDecision::Denied(DenyReason::StoreUnavailable)
            }
        }
    }
}
