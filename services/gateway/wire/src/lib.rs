//! Serial link framing and the VAINA control message model.
//!
//! The gateway host and the mesh radio share a byte-stream serial link. Every
//! VAINA message travels inside a length-prefixed frame; the receiving side
//! runs [`FrameDecoder`] to recover frame boundaries and
//! [`VainaMessage::deserialize`] to turn frame payloads into typed messages.
//!
//! ## Frame Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u8 len (1..=255)     | length of bytes that follow|
//! +----------------------+----------------------------+
//! | payload              | len bytes                  |
//! +----------------------+----------------------------+
//! ```
//!
//! ## Message Format
//!
//! ```text
//! +---------+---------+------------------+-------------------+
//! | u8 type | u8 seq  | u8 prefix (NIB)  | 16B IPv6 address  |
//! +---------+---------+------------------+-------------------+
//! ```
//!
//! `ACK`/`NACK` carry only the two header bytes, `RCS_ADD`/`RCS_DEL` carry
//! the address and `NIB_ADD`/`NIB_DEL` carry both prefix length and address.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod message;
pub mod seqno;

// Re-export main types
pub use error::WireError;
pub use frame::{encode_frame, FrameDecoder, RxState, MAX_FRAME_PAYLOAD, RX_BUFFER_CAPACITY};
pub use message::{
    MessageBody, MessageType, MsgBuf, VainaMessage, HEADER_SIZE, MAX_MESSAGE_SIZE,
    RCS_PREFIX_LEN,
};
pub use seqno::{SequenceGenerator, INITIAL_SEQNO};
