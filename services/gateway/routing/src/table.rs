//! Mesh node tables updated from VAINA requests

use crate::metric::{MetricLimits, MetricType};
use crate::nib::{ForwardingTable, DEFAULT_NIB_CAPACITY, SERIAL_NEXT_HOP};
use crate::rcs::{RouterClientSet, DEFAULT_CLIENT_COST, DEFAULT_RCS_CAPACITY};
use crate::router::{RouterStats, VainaRouter};
use crate::TableError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};
use vaina_wire::MessageBody;

/// Router client set and forwarding table of a mesh node
#[derive(Debug)]
pub struct MeshTables {
    /// Router clients
    rcs: RouterClientSet,
    /// Forwarding table
    nib: ForwardingTable,
    /// Metric ceilings
    limits: MetricLimits,
    /// Counters for statistics
    applied_counter: AtomicU64,
    rejected_counter: AtomicU64,
}

impl MeshTables {
    /// Create tables with explicit capacities
    pub fn new(rcs_capacity: usize, nib_capacity: usize, limits: MetricLimits) -> Self {
        Self {
            rcs: RouterClientSet::new(rcs_capacity),
            nib: ForwardingTable::new(nib_capacity, SERIAL_NEXT_HOP),
            limits,
            applied_counter: AtomicU64::new(0),
            rejected_counter: AtomicU64::new(0),
        }
    }

    /// Router client set
    pub fn rcs(&self) -> &RouterClientSet {
        &self.rcs
    }

    /// Forwarding table
    pub fn nib(&self) -> &ForwardingTable {
        &self.nib
    }

    /// Metric ceilings in use
    pub fn limits(&self) -> MetricLimits {
        self.limits
    }

    async fn apply_body(&self, body: &MessageBody) -> Result<(), TableError> {
        match *body {
            MessageBody::RcsAdd { addr } => {
                let max = self.limits.max(MetricType::HopCount);
                if DEFAULT_CLIENT_COST > max {
                    return Err(TableError::CostExceeded {
                        cost: DEFAULT_CLIENT_COST,
                        max,
                    });
                }
                self.rcs.add(addr, vaina_wire::RCS_PREFIX_LEN, DEFAULT_CLIENT_COST).await?;
            }
            MessageBody::RcsDel { addr } => {
                self.rcs.del(addr, vaina_wire::RCS_PREFIX_LEN).await;
            }
            MessageBody::NibAdd { prefix_len, addr } => {
                self.nib.add(addr, prefix_len).await?;
            }
            MessageBody::NibDel { prefix_len, addr } => {
                self.nib.del(addr, prefix_len).await?;
            }
            MessageBody::Ack | MessageBody::Nack => {
                return Err(TableError::Unsupported(body.message_type()));
            }
        }
        Ok(())
    }
}

impl Default for MeshTables {
    fn default() -> Self {
        Self::new(DEFAULT_RCS_CAPACITY, DEFAULT_NIB_CAPACITY, MetricLimits::default())
    }
}

#[async_trait]
impl VainaRouter for MeshTables {
    async fn apply(&self, body: &MessageBody) -> Result<(), TableError> {
        debug!("Applying {}", body.message_type());

        let result = self.apply_body(body).await;
        match &result {
            Ok(()) => {
                self.applied_counter.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.rejected_counter.fetch_add(1, Ordering::Relaxed);
                warn!("Rejected {}: {}", body.message_type(), e);
            }
        }
        result
    }

    async fn get_stats(&self) -> RouterStats {
        RouterStats {
            requests_applied: self.applied_counter.load(Ordering::Relaxed),
            requests_rejected: self.rejected_counter.load(Ordering::Relaxed),
            rcs_entries: self.rcs.len().await,
            nib_entries: self.nib.len().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;
    use vaina_wire::MessageType;

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_applies_rcs_requests() {
        let tables = MeshTables::default();
        let station = addr("2000::c0a8:402");

        tables.apply(&MessageBody::RcsAdd { addr: station }).await.unwrap();
        assert!(tables.rcs().is_client(station).await.is_some());

        tables.apply(&MessageBody::RcsDel { addr: station }).await.unwrap();
        assert!(tables.rcs().is_empty().await);

        let stats = tables.get_stats().await;
        assert_eq!(stats.requests_applied, 2);
        assert_eq!(stats.rcs_entries, 0);
    }

    #[tokio::test]
    async fn test_applies_nib_requests() {
        let tables = MeshTables::default();
        let body = MessageBody::NibAdd {
            prefix_len: 64,
            addr: addr("2001:db8::"),
        };

        tables.apply(&body).await.unwrap();
        let entry = tables.nib().lookup(addr("2001:db8::42")).await.unwrap();
        assert_eq!(entry.next_hop, SERIAL_NEXT_HOP);

        tables
            .apply(&MessageBody::NibDel {
                prefix_len: 64,
                addr: addr("2001:db8::"),
            })
            .await
            .unwrap();
        assert!(tables.nib().is_empty().await);
    }

    #[tokio::test]
    async fn test_rejections_are_counted() {
        let tables = MeshTables::new(1, 1, MetricLimits::default());

        tables.apply(&MessageBody::RcsAdd { addr: addr("2000::1") }).await.unwrap();
        assert_eq!(
            tables.apply(&MessageBody::RcsAdd { addr: addr("2000::2") }).await,
            Err(TableError::Full { capacity: 1 })
        );
        assert_eq!(
            tables.apply(&MessageBody::Ack).await,
            Err(TableError::Unsupported(MessageType::Ack))
        );

        let stats = tables.get_stats().await;
        assert_eq!(stats.requests_applied, 1);
        assert_eq!(stats.requests_rejected, 2);
    }

    #[tokio::test]
    async fn test_client_cost_respects_hop_count_ceiling() {
        let station = addr("2000::c0a8:402");

        let tables = MeshTables::new(2, 2, MetricLimits::new(0));
        assert_eq!(
            tables.apply(&MessageBody::RcsAdd { addr: station }).await,
            Err(TableError::CostExceeded { cost: 1, max: 0 })
        );
        assert!(tables.rcs().is_empty().await);

        let tables = MeshTables::new(2, 2, MetricLimits::new(1));
        tables.apply(&MessageBody::RcsAdd { addr: station }).await.unwrap();
        assert_eq!(tables.rcs().is_client(station).await.unwrap().cost, 1);
    }
}
