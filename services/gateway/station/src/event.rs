//! Wi-Fi access point events consumed by the gateway.

use crate::mac::MacAddress;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Association ID assigned by the Wi-Fi stack
pub type Aid = u16;

/// Access point events relevant to station tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WifiEvent {
    /// A station associated with the access point
    Associated {
        /// Association ID
        aid: Aid,
        /// Station MAC address
        mac: MacAddress,
    },
    /// The DHCP server leased an address to a station
    LeaseAssigned {
        /// Association ID, when the DHCP server reports it
        #[serde(default)]
        aid: Option<Aid>,
        /// Leased address
        ipv4: Ipv4Addr,
    },
    /// A station left the access point
    Disassociated {
        /// Station MAC address
        mac: MacAddress,
    },
}
