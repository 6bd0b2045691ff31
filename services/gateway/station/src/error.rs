//! Station correlation error types.

use crate::event::Aid;
use crate::mac::MacAddress;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Correlation failures; logged, never turned into a station record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    /// A lease without association ID while several associations are pending
    #[error("lease {ipv4} has no association id and {pending} associations are pending")]
    Ambiguous {
        /// Leased address
        ipv4: Ipv4Addr,
        /// Pending associations it could belong to
        pending: usize,
    },

    /// Association ID reused by a different station before it was paired
    #[error("association id {aid} moved from {previous} to {current}")]
    DuplicatePairing {
        /// Association ID
        aid: Aid,
        /// Station that held it
        previous: MacAddress,
        /// Station now holding it
        current: MacAddress,
    },
}
