//! IPv6 prefix helpers shared by the mesh tables.

use std::net::Ipv6Addr;

/// Longest valid IPv6 prefix length
pub const MAX_PREFIX_LEN: u8 = 128;

/// Zero every bit of `addr` past the first `prefix_len` bits
pub fn mask(addr: Ipv6Addr, prefix_len: u8) -> Ipv6Addr {
    let prefix_len = prefix_len.min(MAX_PREFIX_LEN) as u32;
    let bits = u128::from(addr);
    let masked = match prefix_len {
        0 => 0,
        len => bits & (u128::MAX << (128 - len)),
    };
    Ipv6Addr::from(masked)
}

/// Whether `addr` falls inside `prefix/prefix_len`
pub fn contains(prefix: Ipv6Addr, prefix_len: u8, addr: Ipv6Addr) -> bool {
    mask(addr, prefix_len) == mask(prefix, prefix_len)
}
