//! Station IPv6 address derivation.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Default station prefix; a /96 inside the gateway's mesh /64
pub const DEFAULT_STATION_PREFIX: Ipv6Addr = Ipv6Addr::new(0x2000, 0, 0, 0, 0, 0, 0, 0);

/// Prefix length of the gateway's mesh network
pub const MESH_PREFIX_LEN: u8 = 64;

/// Embed `ipv4` in the low 32 bits of `prefix`
pub fn embed_ipv4(prefix: Ipv6Addr, ipv4: Ipv4Addr) -> Ipv6Addr {
    let high = u128::from(prefix) & !u128::from(u32::MAX);
    Ipv6Addr::from(high | u128::from(u32::from(ipv4)))
}

/// Map an IPv4 address value into [`DEFAULT_STATION_PREFIX`]
pub fn ipv4_to_ipv6(addr: u32) -> Ipv6Addr {
    embed_ipv4(DEFAULT_STATION_PREFIX, Ipv4Addr::from(addr))
}
