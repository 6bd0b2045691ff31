//! NIB forwarding table: prefixes reachable through the serial interface.

use crate::prefix::{contains, mask, MAX_PREFIX_LEN};
use crate::TableError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv6Addr;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Next hop for prefixes learned from the gateway (its link-local address)
pub const SERIAL_NEXT_HOP: Ipv6Addr = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);

/// Default number of forwarding entries
pub const DEFAULT_NIB_CAPACITY: usize = 16;

/// A forwarding table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingEntry {
    /// Destination prefix, masked to `prefix_len`
    pub prefix: Ipv6Addr,
    /// Prefix length in bits
    pub prefix_len: u8,
    /// Next hop address
    pub next_hop: Ipv6Addr,
}

/// Bounded forwarding table
#[derive(Debug)]
pub struct ForwardingTable {
    capacity: usize,
    next_hop: Ipv6Addr,
    entries: RwLock<HashMap<(Ipv6Addr, u8), ForwardingEntry>>,
}

impl ForwardingTable {
    /// Create an empty table routing every prefix via `next_hop`
    pub fn new(capacity: usize, next_hop: Ipv6Addr) -> Self {
        Self {
            capacity,
            next_hop,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Add or refresh a prefix
    pub async fn add(&self, prefix: Ipv6Addr, prefix_len: u8) -> Result<ForwardingEntry, TableError> {
        if prefix_len > MAX_PREFIX_LEN {
            return Err(TableError::InvalidPrefix(prefix_len));
        }
        let prefix = mask(prefix, prefix_len);
        let entry = ForwardingEntry {
            prefix,
            prefix_len,
            next_hop: self.next_hop,
        };

        let mut entries = self.entries.write().await;
        if !entries.contains_key(&(prefix, prefix_len)) && entries.len() >= self.capacity {
            warn!(
                "Forwarding table full ({} entries), rejecting {}/{}",
                self.capacity, prefix, prefix_len
            );
            return Err(TableError::Full {
                capacity: self.capacity,
            });
        }

        entries.insert((prefix, prefix_len), entry);
        info!("Added route {}/{} via {}", prefix, prefix_len, self.next_hop);

        Ok(entry)
    }

    /// Remove a prefix; missing prefixes are ignored
    pub async fn del(&self, prefix: Ipv6Addr, prefix_len: u8) -> Result<Option<ForwardingEntry>, TableError> {
        if prefix_len > MAX_PREFIX_LEN {
            return Err(TableError::InvalidPrefix(prefix_len));
        }
        let prefix = mask(prefix, prefix_len);

        let removed = self.entries.write().await.remove(&(prefix, prefix_len));
        match removed {
            Some(_) => info!("Removed route {}/{}", prefix, prefix_len),
            None => debug!("Route {}/{} not present", prefix, prefix_len),
        }
        Ok(removed)
    }

    /// Longest-prefix match for `addr`
    pub async fn lookup(&self, addr: Ipv6Addr) -> Option<ForwardingEntry> {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| contains(entry.prefix, entry.prefix_len, addr))
            .max_by_key(|entry| entry.prefix_len)
            .copied()
    }

    /// Number of entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the table is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for ForwardingTable {
    fn default() -> Self {
        Self::new(DEFAULT_NIB_CAPACITY, SERIAL_NEXT_HOP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_add_and_lookup() {
        let table = ForwardingTable::default();
        table.add(addr("2001:db8::"), 32).await.unwrap();
        table.add(addr("2001:db8:1::"), 48).await.unwrap();

        let entry = table.lookup(addr("2001:db8:1::5")).await.unwrap();
        assert_eq!(entry.prefix_len, 48);
        assert_eq!(entry.next_hop, SERIAL_NEXT_HOP);

        let entry = table.lookup(addr("2001:db8:2::5")).await.unwrap();
        assert_eq!(entry.prefix_len, 32);

        assert!(table.lookup(addr("2002::1")).await.is_none());
    }

    #[tokio::test]
    async fn test_capacity_allows_refresh() {
        let table = ForwardingTable::new(1, SERIAL_NEXT_HOP);
        table.add(addr("2001:db8::"), 32).await.unwrap();
        table.add(addr("2001:db8::"), 32).await.unwrap();

        let err = table.add(addr("2002::"), 16).await.unwrap_err();
        assert_eq!(err, TableError::Full { capacity: 1 });
    }

    #[tokio::test]
    async fn test_invalid_prefix_and_delete() {
        let table = ForwardingTable::default();
        assert_eq!(
            table.add(addr("2001:db8::"), 129).await.unwrap_err(),
            TableError::InvalidPrefix(129)
        );

        table.add(addr("2001:db8::"), 32).await.unwrap();
        assert!(table.del(addr("2001:db8::"), 32).await.unwrap().is_some());
        assert!(table.del(addr("2001:db8::"), 32).await.unwrap().is_none());
        assert!(table.is_empty().await);
    }
}
