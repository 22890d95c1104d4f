//! The mesh router facade.
//!
//! [`MeshRouter`] owns all per-node routing state in one [`RouterState`]
//! guarded by a `parking_lot` mutex. The lock is only taken for short,
//! synchronous sections; it is never held across an `.await`. Packet
//! handling is split by concern: forwarding lives in `forwarding.rs`, route
//! discovery and control packets in `discovery.rs`.

use crate::config::RouterConfig;
use crate::error::{RoutingError, RoutingResult};
use crate::packet::{PacketBody, RoutingPacket};
use crate::route_table::{RouteEntry, RouteTable};
use crate::seen::SeenSet;
use crate::stats::{HealthMetrics, RouterStats, StatsSnapshot};
use crate::transport::{Delivery, Frame, Transport};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Waiters for one destination's discovery.
pub(crate) type DiscoveryWaiters = Vec<oneshot::Sender<Option<RouteEntry>>>;

/// Everything a router mutates.
pub(crate) struct RouterState {
    pub(crate) table: RouteTable,
    pub(crate) seen: SeenSet,
    pub(crate) seq_num: u64,
    pub(crate) stats: RouterStats,
    pub(crate) pending: HashMap<String, DiscoveryWaiters>,
}

impl RouterState {
    pub(crate) fn next_seq(&mut self) -> u64 {
        self.seq_num += 1;
        self.seq_num
    }
}

/// AODV-style reactive router for one mesh node.
pub struct MeshRouter {
    pub(crate) node_id: String,
    pub(crate) config: RouterConfig,
    pub(crate) state: Mutex<RouterState>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) delivery: Arc<dyn Delivery>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MeshRouter {
    pub fn new(
        node_id: impl Into<String>,
        config: RouterConfig,
        transport: Arc<dyn Transport>,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        let node_id = node_id.into();
        let state = RouterState {
            table: RouteTable::new(node_id.clone(), config.route_timeout()),
            seen: SeenSet::new(config.seen_capacity),
            seq_num: 0,
            stats: RouterStats::default(),
            pending: HashMap::new(),
        };
        Self {
            node_id,
            config,
            state: Mutex::new(state),
            transport,
            delivery,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Start background maintenance: the seen-set cleanup and, when
    /// configured, the HELLO beacon.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();

        let router = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let period = router.config.route_timeout();
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let pruned = {
                    let mut state = router.state.lock();
                    state.seen.clear();
                    state.table.prune_expired()
                };
                debug!(node = %router.node_id, pruned, "seen set cleared");
            }
        }));

        if let Some(period) = self.config.hello_interval() {
            let router = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    ticker.tick().await;
                    router.send_hello().await;
                }
            }));
        }

        info!(node = %self.node_id, "mesh router started");
    }

    /// Feed inbound frames to [`handle_packet`](Self::handle_packet) until
    /// the queue closes or the router stops.
    pub fn spawn_receiver(self: &Arc<Self>, mut inbound: mpsc::UnboundedReceiver<Frame>) {
        let router = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                router.handle_packet(&frame.bytes, &frame.from).await;
            }
            debug!(node = %router.node_id, "inbound queue closed");
        });
        self.tasks.lock().push(task);
    }

    /// Abort background tasks and fail outstanding discoveries.
    pub fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let pending: Vec<DiscoveryWaiters> =
            self.state.lock().pending.drain().map(|(_, w)| w).collect();
        for waiters in pending {
            for tx in waiters {
                let _ = tx.send(None);
            }
        }
        info!(node = %self.node_id, "mesh router stopped");
    }

    pub fn add_neighbor(&self, neighbor_id: &str) {
        self.state.lock().table.add_neighbor(neighbor_id);
    }

    pub fn remove_neighbor(&self, neighbor_id: &str) {
        self.state.lock().table.remove_neighbor(neighbor_id);
    }

    pub fn neighbors(&self) -> Vec<String> {
        self.state.lock().table.neighbors()
    }

    pub fn get_route(&self, destination: &str) -> Vec<RouteEntry> {
        self.state.lock().table.get_route(destination)
    }

    pub fn get_routes(&self) -> BTreeMap<String, Vec<RouteEntry>> {
        self.state.lock().table.get_routes()
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        let state = self.state.lock();
        StatsSnapshot {
            node_id: self.node_id.clone(),
            routes_count: state.table.get_routes().len(),
            stats: state.stats.clone(),
        }
    }

    pub fn get_health_metrics(&self) -> HealthMetrics {
        let state = self.state.lock();
        HealthMetrics::compute(&state.stats, &state.table.get_routes())
    }

    /// Send an application payload; discovers a route first if needed.
    pub async fn send(&self, destination: &str, payload: Vec<u8>) -> bool {
        if destination == self.node_id {
            self.delivery.on_receive(&self.node_id, payload).await;
            return true;
        }
        self.send_body(destination, PacketBody::Data(payload)).await
    }

    /// Send a replication snapshot to `destination`.
    pub async fn send_crdt_update(
        &self,
        destination: &str,
        snapshot: BTreeMap<String, serde_json::Value>,
    ) -> bool {
        if destination == self.node_id {
            debug!(node = %self.node_id, "crdt update to self skipped");
            return true;
        }
        self.send_body(destination, PacketBody::CrdtSync(snapshot)).await
    }

    /// Broadcast a HELLO so neighbours refresh their direct entry for us.
    pub async fn send_hello(&self) -> usize {
        let packet = {
            let mut state = self.state.lock();
            let seq = state.next_seq();
            let packet = RoutingPacket::new(
                self.node_id.clone(),
                String::new(),
                seq,
                1,
                PacketBody::Hello(Vec::new()),
            )
            .with_path(vec![self.node_id.clone()]);
            state.seen.insert(packet.id());
            packet
        };
        let sent = self.broadcast(&packet).await;
        self.state.lock().stats.hello_sent += sent as u64;
        sent
    }

    /// Process one encoded packet received from `from_neighbor`.
    pub async fn handle_packet(&self, data: &[u8], from_neighbor: &str) {
        let packet = match RoutingPacket::decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(node = %self.node_id, from = %from_neighbor, error = %e, "dropping undecodable packet");
                return;
            }
        };

        if let Err(e) = self.accept(&packet, from_neighbor) {
            debug!(node = %self.node_id, error = %e, "packet not accepted");
            return;
        }

        let result = match packet.body {
            PacketBody::Data(_) | PacketBody::CrdtSync(_) => self.handle_data(packet).await,
            PacketBody::RouteRequest { .. } => self.handle_rreq(packet, from_neighbor).await,
            PacketBody::RouteReply(_) => self.handle_rrep(packet, from_neighbor).await,
            PacketBody::RouteError { .. } => self.handle_rerr(packet, from_neighbor).await,
            PacketBody::Hello(_) => {
                self.handle_hello(&packet, from_neighbor);
                Ok(())
            }
        };

        if let Err(e) = result {
            debug!(node = %self.node_id, error = %e, "packet dropped");
        }
    }

    /// De-duplicate, count and learn the reverse route.
    fn accept(&self, packet: &RoutingPacket, from_neighbor: &str) -> RoutingResult<()> {
        let mut state = self.state.lock();
        if !state.seen.insert(packet.id()) {
            state.stats.duplicates_dropped += 1;
            return Err(RoutingError::Duplicate(packet.id().to_string()));
        }
        state.stats.packets_received += 1;

        let header = &packet.header;
        if header.source != self.node_id {
            // For route requests the accumulated path doubles as the
            // reverse path back to the source.
            let path = matches!(packet.body, PacketBody::RouteRequest { .. }).then(|| {
                std::iter::once(self.node_id.clone())
                    .chain(header.path_traversed.iter().rev().cloned())
                    .collect()
            });
            state.table.update_route(
                &header.source,
                from_neighbor,
                header.hop_count + 1,
                header.seq_num,
                path,
            );
        }
        Ok(())
    }

    async fn handle_data(&self, packet: RoutingPacket) -> RoutingResult<()> {
        if packet.header.destination != self.node_id {
            return self.forward(packet).await;
        }

        let source = packet.header.source;
        match packet.body {
            PacketBody::Data(payload) => {
                debug!(node = %self.node_id, source = %source, "data delivered");
                self.delivery.on_receive(&source, payload).await;
            }
            PacketBody::CrdtSync(snapshot) => {
                debug!(node = %self.node_id, source = %source, keys = snapshot.len(), "crdt sync delivered");
                self.delivery.on_crdt_sync(&source, snapshot).await;
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_hello(&self, packet: &RoutingPacket, from_neighbor: &str) {
        let mut state = self.state.lock();
        state.stats.hello_received += 1;
        if packet.header.source == from_neighbor {
            state.table.add_neighbor(from_neighbor);
        }
    }
}
