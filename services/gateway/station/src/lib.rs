//! Wi-Fi station correlation for the mesh gateway.
//!
//! The Wi-Fi stack reports a station's association (with its MAC) and its
//! DHCP lease (with its IPv4 address) as separate, unordered events. The
//! [`StationGateway`] pairs them by association ID, derives the station's
//! mesh IPv6 address and announces it to the mesh radio as a router client
//! (`RCS_ADD`), withdrawing it (`RCS_DEL`) when the station leaves.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod addr;
pub mod error;
pub mod event;
pub mod gateway;
pub mod mac;
pub mod observer;

// Re-export main types
pub use addr::{embed_ipv4, ipv4_to_ipv6, DEFAULT_STATION_PREFIX, MESH_PREFIX_LEN};
pub use error::CorrelationError;
pub use event::{Aid, WifiEvent};
pub use gateway::{StationConfig, StationGateway, StationRecord, DEFAULT_MAX_PENDING};
pub use mac::{MacAddress, MacParseError};
pub use observer::{ChannelObserver, StationNotification, StationObserver};
