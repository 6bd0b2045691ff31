//! Serial transport, frame receive loop, and the VAINA request session.
//!
//! This crate moves VAINA messages between the gateway host and the mesh
//! radio over a byte-stream serial link.
//!
//! ## Features
//!
//! - **Transports**: character devices and TCP serial bridges
//! - **Framing**: length-prefixed frame writer and a receive task with
//!   stall timeouts and link availability tracking
//! - **Acknowledgements**: per-request timeout with bounded retransmission
//! - **Request handling**: inbound requests applied through a
//!   [`VainaRouter`](vaina_routing::VainaRouter) and answered with `ACK`/`NACK`
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::{mpsc, watch};
//! use vaina_routing::RejectAll;
//! use vaina_session::{IoStream, SerialEndpoint, Session, SessionConfig, SessionEvent};
//! use vaina_wire::VainaMessage;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let stream = IoStream::open(&SerialEndpoint::Tcp("127.0.0.1:4001".into())).await?;
//! let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
//! let (event_tx, mut event_rx) = mpsc::channel(64);
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! tokio::spawn(Session::run(
//!     SessionConfig::default(),
//!     stream,
//!     Arc::new(RejectAll),
//!     outbound_rx,
//!     event_tx,
//!     shutdown_rx,
//! ));
//!
//! outbound_tx.send(VainaMessage::rcs_add(1, "2000::c0a8:402".parse()?))?;
//!
//! while let Some(event) = event_rx.recv().await {
//!     match event {
//!         SessionEvent::Delivered { message, attempts } => {
//!             println!("{} delivered after {} attempts", message, attempts);
//!         }
//!         SessionEvent::DeliveryFailed { message, .. } => {
//!             println!("{} was never acknowledged", message);
//!         }
//!         other => println!("{:?}", other),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod link;
pub mod reliability;
pub mod session;
pub mod transport;

// Re-export main types
pub use error::TransportError;
pub use link::{run_receiver, FrameReader, FrameWriter, LinkEvent};
pub use reliability::{PendingRequest, PendingRequests};
pub use session::{Session, SessionConfig, SessionEvent, SessionStats};
pub use transport::{connect_tcp, open_device, IoStream, SerialEndpoint};
