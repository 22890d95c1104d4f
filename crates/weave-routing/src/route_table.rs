//! Multipath route table.
//!
//! A destination may be reachable through several next hops. Entries are
//! keyed by `(destination, next_hop)`; lookups hide invalid and expired
//! entries and return the rest best-first.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// One way of reaching a destination.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
    pub destination: String,
    pub next_hop: String,
    /// Number of hops to the destination (>= 1)
    pub hop_count: u32,
    pub seq_num: u64,
    /// When the entry was installed or last replaced
    pub created: Instant,
    pub valid: bool,
    /// Node ids from this node to the destination
    pub path: Vec<String>,
}

impl RouteEntry {
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn is_fresh(&self, timeout: Duration) -> bool {
        self.valid && self.age() < timeout
    }

    fn is_direct(&self) -> bool {
        self.hop_count == 1 && self.next_hop == self.destination
    }
}

/// Result of route update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteUpdate {
    /// First entry for this next hop
    New,
    /// Existing entry replaced
    Updated,
    /// Not better than the existing entry
    Ignored,
    /// Route rejected (invalid)
    Rejected(String),
}

/// Route table owned by a single router.
#[derive(Debug)]
pub struct RouteTable {
    node_id: String,
    routes: HashMap<String, Vec<RouteEntry>>,
    route_timeout: Duration,
}

impl RouteTable {
    pub fn new(node_id: impl Into<String>, route_timeout: Duration) -> Self {
        Self {
            node_id: node_id.into(),
            routes: HashMap::new(),
            route_timeout,
        }
    }

    pub fn route_timeout(&self) -> Duration {
        self.route_timeout
    }

    /// Install or refresh the direct entry for a neighbour.
    pub fn add_neighbor(&mut self, neighbor_id: &str) {
        if neighbor_id == self.node_id {
            return;
        }
        let entry = RouteEntry {
            destination: neighbor_id.to_string(),
            next_hop: neighbor_id.to_string(),
            hop_count: 1,
            seq_num: 0,
            created: Instant::now(),
            valid: true,
            path: vec![self.node_id.clone(), neighbor_id.to_string()],
        };

        let entries = self.routes.entry(neighbor_id.to_string()).or_default();
        match entries.iter_mut().find(|e| e.is_direct()) {
            Some(existing) => {
                // Keep the freshest sequence number seen on this link.
                let seq_num = existing.seq_num;
                *existing = RouteEntry { seq_num, ..entry };
            }
            None => entries.push(entry),
        }
        debug!(node = %self.node_id, neighbor = %neighbor_id, "neighbor added");
    }

    /// Forget a neighbour and every route through it.
    pub fn remove_neighbor(&mut self, neighbor_id: &str) -> usize {
        let mut removed = self.routes.remove(neighbor_id).map_or(0, |v| v.len());
        for entries in self.routes.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.next_hop != neighbor_id);
            removed += before - entries.len();
        }
        self.routes.retain(|_, entries| !entries.is_empty());
        debug!(node = %self.node_id, neighbor = %neighbor_id, removed, "neighbor removed");
        removed
    }

    /// Offer a route learned from the network.
    ///
    /// An entry for the same next hop is replaced by a strictly higher
    /// sequence number, or an equal one with fewer hops. Invalid or expired
    /// entries are always replaced.
    pub fn update_route(
        &mut self,
        destination: &str,
        next_hop: &str,
        hop_count: u32,
        seq_num: u64,
        path: Option<Vec<String>>,
    ) -> RouteUpdate {
        if destination == self.node_id {
            return RouteUpdate::Rejected("Route to self".to_string());
        }
        if hop_count == 0 {
            return RouteUpdate::Rejected("Zero hop count".to_string());
        }

        let path = path.unwrap_or_else(|| {
            if next_hop == destination {
                vec![self.node_id.clone(), destination.to_string()]
            } else {
                vec![
                    self.node_id.clone(),
                    next_hop.to_string(),
                    destination.to_string(),
                ]
            }
        });
        let entry = RouteEntry {
            destination: destination.to_string(),
            next_hop: next_hop.to_string(),
            hop_count,
            seq_num,
            created: Instant::now(),
            valid: true,
            path,
        };

        let timeout = self.route_timeout;
        let entries = self.routes.entry(destination.to_string()).or_default();
        let Some(existing) = entries.iter_mut().find(|e| e.next_hop == next_hop) else {
            debug!(node = %self.node_id, destination, next_hop, hop_count, "new route");
            entries.push(entry);
            return RouteUpdate::New;
        };

        let better = seq_num > existing.seq_num
            || (seq_num == existing.seq_num && hop_count < existing.hop_count);
        if better || !existing.is_fresh(timeout) {
            debug!(node = %self.node_id, destination, next_hop, hop_count, seq_num, "route updated");
            *existing = entry;
            RouteUpdate::Updated
        } else {
            RouteUpdate::Ignored
        }
    }

    /// Fresh routes to `destination`, fewest hops first, then highest
    /// sequence number.
    pub fn get_route(&self, destination: &str) -> Vec<RouteEntry> {
        let mut routes: Vec<RouteEntry> = self
            .routes
            .get(destination)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.is_fresh(self.route_timeout))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        routes.sort_by(|a, b| {
            a.hop_count
                .cmp(&b.hop_count)
                .then_with(|| b.seq_num.cmp(&a.seq_num))
        });
        routes
    }

    pub fn best_route(&self, destination: &str) -> Option<RouteEntry> {
        self.get_route(destination).into_iter().next()
    }

    /// All destinations with at least one fresh route.
    pub fn get_routes(&self) -> BTreeMap<String, Vec<RouteEntry>> {
        self.routes
            .keys()
            .filter_map(|dest| {
                let routes = self.get_route(dest);
                (!routes.is_empty()).then(|| (dest.clone(), routes))
            })
            .collect()
    }

    /// Mark entries for `destination` via `next_hop` invalid.
    pub fn invalidate_via(&mut self, destination: &str, next_hop: &str) -> usize {
        let mut count = 0;
        if let Some(entries) = self.routes.get_mut(destination) {
            for entry in entries.iter_mut().filter(|e| e.next_hop == next_hop && e.valid) {
                entry.valid = false;
                count += 1;
            }
        }
        count
    }

    /// Delete entries for `destination` via `next_hop`.
    pub fn remove_via(&mut self, destination: &str, next_hop: &str) -> usize {
        let Some(entries) = self.routes.get_mut(destination) else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|e| e.next_hop != next_hop);
        let removed = before - entries.len();
        if entries.is_empty() {
            self.routes.remove(destination);
        }
        removed
    }

    /// Direct neighbours with a fresh 1-hop entry.
    pub fn neighbors(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .routes
            .iter()
            .filter(|(_, entries)| {
                entries
                    .iter()
                    .any(|e| e.is_direct() && e.is_fresh(self.route_timeout))
            })
            .map(|(dest, _)| dest.clone())
            .collect();
        out.sort();
        out
    }

    pub fn is_neighbor(&self, node_id: &str) -> bool {
        self.routes.get(node_id).is_some_and(|entries| {
            entries
                .iter()
                .any(|e| e.is_direct() && e.is_fresh(self.route_timeout))
        })
    }

    /// Drop invalid and expired entries.
    pub fn prune_expired(&mut self) -> usize {
        let timeout = self.route_timeout;
        let mut removed = 0;
        for entries in self.routes.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.is_fresh(timeout));
            removed += before - entries.len();
        }
        self.routes.retain(|_, entries| !entries.is_empty());
        removed
    }
}
