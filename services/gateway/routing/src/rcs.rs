//! Router Client Set: addresses this node originates routes for.

use crate::prefix::{contains, mask, MAX_PREFIX_LEN};
use crate::TableError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv6Addr;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Default number of router clients a node serves
pub const DEFAULT_RCS_CAPACITY: usize = 2;

/// Cost recorded for clients registered over VAINA
pub const DEFAULT_CLIENT_COST: u8 = 1;

/// A router client entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcsEntry {
    /// Client prefix, masked to `prefix_len`
    pub addr: Ipv6Addr,
    /// Prefix length in bits
    pub prefix_len: u8,
    /// Cost of reaching the client
    pub cost: u8,
}

/// Bounded set of router clients
#[derive(Debug)]
pub struct RouterClientSet {
    capacity: usize,
    entries: RwLock<HashMap<(Ipv6Addr, u8), RcsEntry>>,
}

impl RouterClientSet {
    /// Create an empty set holding at most `capacity` clients
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Maximum number of clients
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a client.
    ///
    /// The prefix length is clamped to 128 and the address masked to it.
    /// Re-adding an existing client returns the stored entry unchanged so a
    /// retransmitted request is answered the same way as the original.
    pub async fn add(&self, addr: Ipv6Addr, prefix_len: u8, cost: u8) -> Result<RcsEntry, TableError> {
        let prefix_len = prefix_len.min(MAX_PREFIX_LEN);
        let addr = mask(addr, prefix_len);

        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(&(addr, prefix_len)) {
            debug!("Router client {}/{} already present", addr, prefix_len);
            return Ok(*existing);
        }

        if entries.len() >= self.capacity {
            warn!(
                "Router client set full ({} entries), rejecting {}/{}",
                self.capacity, addr, prefix_len
            );
            return Err(TableError::Full {
                capacity: self.capacity,
            });
        }

        let entry = RcsEntry {
            addr,
            prefix_len,
            cost,
        };
        entries.insert((addr, prefix_len), entry);
        info!("Added router client {}/{} (cost: {})", addr, prefix_len, cost);

        Ok(entry)
    }

    /// Remove a client; missing clients are ignored
    pub async fn del(&self, addr: Ipv6Addr, prefix_len: u8) -> Option<RcsEntry> {
        let prefix_len = prefix_len.min(MAX_PREFIX_LEN);
        let addr = mask(addr, prefix_len);

        let removed = self.entries.write().await.remove(&(addr, prefix_len));
        match removed {
            Some(_) => info!("Removed router client {}/{}", addr, prefix_len),
            None => debug!("Router client {}/{} not present", addr, prefix_len),
        }
        removed
    }

    /// Exact lookup of a client entry
    pub async fn matches(&self, addr: Ipv6Addr, prefix_len: u8) -> Option<RcsEntry> {
        let prefix_len = prefix_len.min(MAX_PREFIX_LEN);
        self.entries
            .read()
            .await
            .get(&(mask(addr, prefix_len), prefix_len))
            .copied()
    }

    /// Most specific client entry covering `addr`
    pub async fn is_client(&self, addr: Ipv6Addr) -> Option<RcsEntry> {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| contains(entry.addr, entry.prefix_len, addr))
            .max_by_key(|entry| entry.prefix_len)
            .copied()
    }

    /// Number of clients
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the set is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// All clients, ordered by address
    pub async fn entries(&self) -> Vec<RcsEntry> {
        let mut entries: Vec<RcsEntry> = self.entries.read().await.values().copied().collect();
        entries.sort_by_key(|entry| (entry.addr, entry.prefix_len));
        entries
    }
}

impl Default for RouterClientSet {
    fn default() -> Self {
        Self::new(DEFAULT_RCS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_add_and_capacity() {
        let rcs = RouterClientSet::default();

        rcs.add(addr("2000::c0a8:402"), 128, 1).await.unwrap();
        rcs.add(addr("2000::c0a8:403"), 128, 1).await.unwrap();
        assert_eq!(rcs.len().await, 2);

        let err = rcs.add(addr("2000::c0a8:404"), 128, 1).await.unwrap_err();
        assert_eq!(err, TableError::Full { capacity: 2 });
    }

    #[tokio::test]
    async fn test_re_add_is_idempotent() {
        let rcs = RouterClientSet::new(1);

        let first = rcs.add(addr("2000::1"), 128, 1).await.unwrap();
        let second = rcs.add(addr("2000::1"), 128, 7).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(rcs.len().await, 1);
    }

    #[tokio::test]
    async fn test_prefix_is_clamped_and_masked() {
        let rcs = RouterClientSet::default();

        let entry = rcs.add(addr("2001:db8::ffff"), 200, 1).await.unwrap();
        assert_eq!(entry.prefix_len, 128);

        let entry = rcs.add(addr("2001:db8:0:1::5"), 64, 3).await.unwrap();
        assert_eq!(entry.addr, addr("2001:db8:0:1::"));
        assert!(rcs.matches(addr("2001:db8:0:1::9"), 64).await.is_some());
    }

    #[tokio::test]
    async fn test_is_client_prefers_longest_prefix() {
        let rcs = RouterClientSet::default();
        rcs.add(addr("2000::"), 64, 4).await.unwrap();
        rcs.add(addr("2000::c0a8:402"), 128, 1).await.unwrap();

        let entry = rcs.is_client(addr("2000::c0a8:402")).await.unwrap();
        assert_eq!(entry.prefix_len, 128);

        let entry = rcs.is_client(addr("2000::7")).await.unwrap();
        assert_eq!(entry.prefix_len, 64);

        assert!(rcs.is_client(addr("2001::1")).await.is_none());
    }

    #[tokio::test]
    async fn test_del_missing_is_noop() {
        let rcs = RouterClientSet::default();
        assert!(rcs.del(addr("2000::1"), 128).await.is_none());

        rcs.add(addr("2000::1"), 128, 1).await.unwrap();
        assert!(rcs.del(addr("2000::1"), 128).await.is_some());
        assert!(rcs.is_empty().await);
    }
}
