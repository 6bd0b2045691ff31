//! Routing table error types.

use thiserror::Error;
use vaina_wire::MessageType;

/// Errors raised while applying a VAINA request to the mesh tables
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// Table already holds its maximum number of entries
    #[error("table full ({capacity} entries)")]
    Full {
        /// Configured capacity
        capacity: usize,
    },

    /// Prefix length above 128
    #[error("invalid prefix length {0}")]
    InvalidPrefix(u8),

    /// Entry cost above the configured metric ceiling
    #[error("cost {cost} exceeds metric ceiling {max}")]
    CostExceeded {
        /// Cost the entry would carry
        cost: u8,
        /// Configured ceiling
        max: u8,
    },

    /// Message type this router does not apply
    #[error("unsupported message {0}")]
    Unsupported(MessageType),
}
