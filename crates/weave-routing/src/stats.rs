//! Router counters and derived health metrics.

use crate::route_table::RouteEntry;
use serde::Serialize;
use std::collections::BTreeMap;

/// Raw per-router counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_forwarded: u64,
    pub packets_dropped: u64,
    pub duplicates_dropped: u64,
    pub rreq_sent: u64,
    pub rreq_received: u64,
    pub rrep_sent: u64,
    pub rrep_received: u64,
    pub rerr_sent: u64,
    pub rerr_received: u64,
    pub hello_sent: u64,
    pub hello_received: u64,
    pub routes_discovered: u64,
}

/// Counters plus the size of the route table, as returned by `get_stats`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub node_id: String,
    pub routes_count: usize,
    #[serde(flatten)]
    pub stats: RouterStats,
}

/// Ratios consumed by an external control loop.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthMetrics {
    pub packet_drop_rate: f64,
    pub route_discovery_success_rate: f64,
    pub total_routes_known: usize,
    pub avg_route_hop_count: f64,
    pub routing_overhead_ratio: f64,
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl HealthMetrics {
    pub fn compute(stats: &RouterStats, routes: &BTreeMap<String, Vec<RouteEntry>>) -> Self {
        let involved = stats.packets_sent
            + stats.packets_received
            + stats.packets_forwarded
            + stats.rreq_sent
            + stats.rreq_received
            + stats.rrep_sent
            + stats.rrep_received;
        let control = stats.rreq_sent + stats.rreq_received + stats.rrep_sent + stats.rrep_received;
        let data = stats.packets_sent + stats.packets_forwarded;

        let (hops, entries) = routes
            .values()
            .flatten()
            .fold((0u64, 0u64), |(h, n), e| (h + e.hop_count as u64, n + 1));

        Self {
            packet_drop_rate: ratio(stats.packets_dropped, involved),
            route_discovery_success_rate: ratio(stats.routes_discovered, stats.rreq_sent),
            total_routes_known: routes.len(),
            avg_route_hop_count: ratio(hops, entries),
            routing_overhead_ratio: ratio(control, data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route_table::RouteTable;
    use std::time::Duration;

    #[test]
    fn test_empty_metrics_are_zero() {
        let metrics = HealthMetrics::compute(&RouterStats::default(), &BTreeMap::new());
        assert_eq!(metrics.packet_drop_rate, 0.0);
        assert_eq!(metrics.route_discovery_success_rate, 0.0);
        assert_eq!(metrics.total_routes_known, 0);
        assert_eq!(metrics.avg_route_hop_count, 0.0);
        assert_eq!(metrics.routing_overhead_ratio, 0.0);
    }

    #[test]
    fn test_metric_formulas() {
        let stats = RouterStats {
            packets_sent: 4,
            packets_received: 2,
            packets_forwarded: 4,
            packets_dropped: 3,
            rreq_sent: 2,
            rreq_received: 1,
            rrep_sent: 1,
            rrep_received: 1,
            routes_discovered: 1,
            ..Default::default()
        };
        let mut table = RouteTable::new("a", Duration::from_secs(60));
        table.add_neighbor("b");
        table.update_route("c", "b", 3, 1, None);

        let metrics = HealthMetrics::compute(&stats, &table.get_routes());
        assert_eq!(metrics.packet_drop_rate, 3.0 / 15.0);
        assert_eq!(metrics.route_discovery_success_rate, 0.5);
        assert_eq!(metrics.total_routes_known, 2);
        assert_eq!(metrics.avg_route_hop_count, 2.0);
        assert_eq!(metrics.routing_overhead_ratio, 5.0 / 8.0);
    }
}
