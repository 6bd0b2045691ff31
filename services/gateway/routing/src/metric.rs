//! Routing metric arithmetic for the distance-vector mesh protocol.
//!
//! Metric types follow the routing metric registry of RFC 6551 section 6.1.
//! Only hop count is implemented; every other type answers with the neutral
//! sentinel (`0`, `false` or `None`) so callers can treat it as unsupported
//! without a separate error path.

use serde::{Deserialize, Serialize};

/// Default ceiling of the hop count metric
pub const DEFAULT_HOP_COUNT_MAX: u8 = u8::MAX;

/// Cost of traversing one link under the hop count metric
pub const HOP_COUNT_LINK_COST: u8 = 1;

/// Routing metric types (RFC 6551 section 6.1)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    /// Node state and attribute object
    NodeStateAndAttribute = 1,
    /// Node energy object
    NodeEnergy = 2,
    /// Hop count object
    HopCount = 3,
    /// Link throughput object
    LinkThroughput = 4,
    /// Link latency object
    LinkLatency = 5,
    /// Link quality level object
    LinkQualityLevel = 6,
    /// Link ETX object
    LinkEtx = 7,
    /// Link color object
    LinkColor = 8,
}

/// Per-type metric ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricLimits {
    /// Largest representable hop count
    pub hop_count_max: u8,
}

impl MetricLimits {
    /// Create limits with a custom hop count ceiling
    pub fn new(hop_count_max: u8) -> Self {
        Self { hop_count_max }
    }

    /// Maximum value of the metric
    pub fn max(&self, metric_type: MetricType) -> u8 {
        match metric_type {
            MetricType::HopCount => self.hop_count_max,
            _ => 0,
        }
    }

    /// Account for one more link, saturating at [`max`](Self::max)
    pub fn update(&self, metric_type: MetricType, metric: &mut u8) {
        if metric_type == MetricType::HopCount {
            *metric = metric
                .saturating_add(HOP_COUNT_LINK_COST)
                .min(self.hop_count_max);
        }
    }

    /// Cost of a route advertised with `advertised`, once reached over our link.
    ///
    /// `None` when the type is unsupported or the result exceeds the ceiling.
    pub fn path_cost(&self, metric_type: MetricType, advertised: u8) -> Option<u8> {
        if !is_supported(metric_type) {
            return None;
        }
        advertised
            .checked_add(link_cost(metric_type))
            .filter(|cost| *cost <= self.max(metric_type))
    }

    /// Whether a candidate route should replace an existing one
    pub fn offers_improvement(&self, metric_type: MetricType, existing: u8, candidate: u8) -> bool {
        is_supported(metric_type)
            && candidate <= self.max(metric_type)
            && loop_free(metric_type, candidate, existing)
            && candidate < existing
    }
}

impl Default for MetricLimits {
    fn default() -> Self {
        Self {
            hop_count_max: DEFAULT_HOP_COUNT_MAX,
        }
    }
}

/// Whether the metric type has an implementation
pub fn is_supported(metric_type: MetricType) -> bool {
    metric_type == MetricType::HopCount
}

/// Cost of a single link
pub fn link_cost(metric_type: MetricType) -> u8 {
    match metric_type {
        MetricType::HopCount => HOP_COUNT_LINK_COST,
        _ => 0,
    }
}

/// Loop-freedom check: a route costing `a` may follow one costing `b`
pub fn loop_free(metric_type: MetricType, a: u8, b: u8) -> bool {
    match metric_type {
        MetricType::HopCount => a <= b,
        _ => false,
    }
}

/// Maximum value of the metric under the default limits
pub fn max(metric_type: MetricType) -> u8 {
    MetricLimits::default().max(metric_type)
}

/// Account for one more link under the default limits
pub fn update(metric_type: MetricType, metric: &mut u8) {
    MetricLimits::default().update(metric_type, metric)
}

/// Path cost under the default limits
pub fn path_cost(metric_type: MetricType, advertised: u8) -> Option<u8> {
    MetricLimits::default().path_cost(metric_type, advertised)
}

/// Route improvement check under the default limits
pub fn offers_improvement(metric_type: MetricType, existing: u8, candidate: u8) -> bool {
    MetricLimits::default().offers_improvement(metric_type, existing, candidate)
}
