//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Length byte of zero on the serial link
    #[error("zero-length frame")]
    ZeroLength,

    /// Attempt to frame an empty payload
    #[error("empty payload")]
    Empty,

    /// Size limit exceeded
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Message shorter than its type requires
    #[error("incomplete message")]
    Incomplete,

    /// Unknown message type
    #[error("unknown type {0}")]
    Type(u8),

    /// Prefix length above 128
    #[error("invalid prefix length {0}")]
    PrefixLength(u8),

    /// Bytes left over after a complete message
    #[error("malformed message")]
    Malformed,
}
