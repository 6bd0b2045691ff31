//! Serial transport error types.

use std::time::Duration;
use thiserror::Error;
use vaina_wire::WireError;

/// Errors on the serial link
#[derive(Error, Debug)]
pub enum TransportError {
    /// The device accepted only part of a frame
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Frame size
        expected: usize,
        /// Bytes accepted before the device stopped
        written: usize,
    },

    /// End of stream on the serial link
    #[error("link down")]
    LinkDown,

    /// Frame could not be built or parsed
    #[error("framing error: {0}")]
    Framing(#[from] WireError),

    /// A partially received frame stalled
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// Underlying I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the link can keep going after this error.
    ///
    /// Zero-length frames and payload stalls only count towards the fault
    /// threshold; everything else ends the receive task.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::Framing(WireError::ZeroLength) | TransportError::Timeout(_)
        )
    }
}
