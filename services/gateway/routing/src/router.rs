//! Router trait applied by the request session to inbound VAINA requests

use crate::TableError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vaina_wire::MessageBody;

/// Applies VAINA requests received over the serial link.
///
/// `Ok` is answered with `ACK` and `Err` with `NACK`. Replies (`ACK`/`NACK`)
/// are consumed by the session itself and never reach the router.
#[async_trait]
pub trait VainaRouter: Send + Sync {
    /// Apply a request to the routing state
    async fn apply(&self, body: &MessageBody) -> Result<(), TableError>;

    /// Get routing statistics
    async fn get_stats(&self) -> RouterStats;
}

/// Router statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Requests applied successfully
    pub requests_applied: u64,
    /// Requests rejected
    pub requests_rejected: u64,
    /// Router clients currently registered
    pub rcs_entries: usize,
    /// Forwarding table entries
    pub nib_entries: usize,
}

/// Router for the gateway side, which issues requests but applies none
#[derive(Debug, Default)]
pub struct RejectAll;

#[async_trait]
impl VainaRouter for RejectAll {
    async fn apply(&self, body: &MessageBody) -> Result<(), TableError> {
        Err(TableError::Unsupported(body.message_type()))
    }

    async fn get_stats(&self) -> RouterStats {
        RouterStats::default()
    }
}
