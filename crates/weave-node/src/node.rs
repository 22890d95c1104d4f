//! A mesh node: one router and one replica wired together.
//!
//! Inbound DATA packets surface as [`NodeEvent::Message`]. Inbound
//! CRDT_SYNC snapshots are reconciled with the local replica; when the
//! replica had changes the peer has not seen, they are sent straight back
//! so both sides end up with the join.

use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use weave_core::{Crdt, CrdtValue};
use weave_routing::{ChannelDelivery, Delivered, MemoryNetwork, MeshRouter, Transport};
use weave_sync::{
    spawn_gc, CrdtDelta, CrdtSyncOptimizer, DeltaOp, GcHandle, SyncEntry, SyncError, SyncReport,
};

/// Events emitted by a node.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeEvent {
    /// An application payload arrived.
    Message { source: String, payload: Vec<u8> },
    /// A peer's snapshot was reconciled.
    Synced {
        peer_id: String,
        received: usize,
        replied: bool,
    },
}

pub struct MeshNode {
    config: NodeConfig,
    router: Arc<MeshRouter>,
    optimizer: Arc<Mutex<CrdtSyncOptimizer>>,
    events: broadcast::Sender<NodeEvent>,
    deliveries: SyncMutex<Option<mpsc::UnboundedReceiver<Delivered>>>,
    tasks: SyncMutex<Vec<JoinHandle<()>>>,
    gc: SyncMutex<Option<GcHandle>>,
}

impl MeshNode {
    /// Build a node over `transport`. Inbound frames must be fed to
    /// [`MeshRouter::handle_packet`] by the caller.
    pub fn new(config: NodeConfig, transport: Arc<dyn Transport>) -> NodeResult<Self> {
        config.validate()?;

        let (delivery, deliveries) = ChannelDelivery::new();
        let router = Arc::new(MeshRouter::new(
            config.node_id.clone(),
            config.router.clone(),
            transport,
            Arc::new(delivery),
        ));
        let optimizer = CrdtSyncOptimizer::with_config(config.node_id.clone(), config.sync.clone());
        let (events, _) = broadcast::channel(256);

        Ok(Self {
            config,
            router,
            optimizer: Arc::new(Mutex::new(optimizer)),
            events,
            deliveries: SyncMutex::new(Some(deliveries)),
            tasks: SyncMutex::new(Vec::new()),
            gc: SyncMutex::new(None),
        })
    }

    /// Join an in-memory network and start reading from it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn join(network: &MemoryNetwork, config: NodeConfig) -> NodeResult<Self> {
        let (transport, inbound) = network.join(config.node_id.clone());
        let node = Self::new(config, transport)?;
        node.router.spawn_receiver(inbound);
        Ok(node)
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<MeshRouter> {
        &self.router
    }

    pub fn optimizer(&self) -> &Arc<Mutex<CrdtSyncOptimizer>> {
        &self.optimizer
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Start router maintenance, delivery handling and the delta sweep.
    pub fn start(&self) -> NodeResult<()> {
        let deliveries = self
            .deliveries
            .lock()
            .take()
            .ok_or(NodeError::AlreadyStarted)?;

        self.router.start();
        let task = tokio::spawn(handle_deliveries(
            Arc::clone(&self.router),
            Arc::clone(&self.optimizer),
            self.events.clone(),
            deliveries,
        ));
        self.tasks.lock().push(task);

        if self.config.sync.gc_enabled {
            let handle = spawn_gc(Arc::clone(&self.optimizer), self.config.sync.gc_interval());
            *self.gc.lock() = Some(handle);
        }

        info!(node = %self.config.node_id, "mesh node started");
        Ok(())
    }

    pub fn stop(&self) {
        self.router.stop();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        if let Some(gc) = self.gc.lock().take() {
            gc.stop();
        }
        info!(node = %self.config.node_id, "mesh node stopped");
    }

    pub fn add_neighbor(&self, neighbor_id: &str) {
        self.router.add_neighbor(neighbor_id);
    }

    pub async fn send(&self, destination: &str, payload: Vec<u8>) -> bool {
        self.router.send(destination, payload).await
    }

    pub async fn register(&self, key: impl Into<String>, crdt: Crdt) -> NodeResult<()> {
        self.optimizer.lock().await.register(key, crdt)?;
        Ok(())
    }

    /// Mutate a registered value in place.
    pub async fn update<R>(&self, key: &str, f: impl FnOnce(&mut Crdt) -> R) -> NodeResult<R> {
        let mut optimizer = self.optimizer.lock().await;
        let crdt = optimizer
            .get_mut(key)
            .ok_or_else(|| SyncError::UnknownKey(key.to_string()))?;
        Ok(f(crdt))
    }

    /// Add `amount` to this node's entry of a counter.
    pub async fn increment(&self, key: &str, amount: u64) -> NodeResult<()> {
        let node_id = self.config.node_id.clone();
        self.update(key, |crdt| match crdt.as_counter_mut() {
            Some(counter) => {
                counter.increment(node_id, amount);
                Ok(())
            }
            None => Err(SyncError::OperationMismatch {
                operation: "increment".to_string(),
                kind: crdt.kind(),
            }),
        })
        .await??;
        Ok(())
    }

    pub async fn value(&self, key: &str) -> Option<CrdtValue> {
        self.optimizer.lock().await.get(key).map(Crdt::value)
    }

    pub async fn sync_report(&self) -> SyncReport {
        self.optimizer.lock().await.get_metrics()
    }

    /// Push the full local snapshot to `peer`.
    pub async fn replicate_to(&self, peer: &str) -> NodeResult<()> {
        let snapshot = self.optimizer.lock().await.snapshot();
        let keys = snapshot.len();
        if self.router.send_crdt_update(peer, snapshot).await {
            debug!(node = %self.config.node_id, peer, keys, "snapshot pushed");
            Ok(())
        } else {
            Err(NodeError::Unreachable(peer.to_string()))
        }
    }

    /// Push the local snapshot to every current neighbour; returns how many
    /// pushes went out.
    pub async fn replicate_to_neighbors(&self) -> usize {
        let mut pushed = 0;
        for neighbor in self.router.neighbors() {
            match self.replicate_to(&neighbor).await {
                Ok(()) => pushed += 1,
                Err(e) => warn!(node = %self.config.node_id, error = %e, "replication push failed"),
            }
        }
        pushed
    }
}

async fn handle_deliveries(
    router: Arc<MeshRouter>,
    optimizer: Arc<Mutex<CrdtSyncOptimizer>>,
    events: broadcast::Sender<NodeEvent>,
    mut deliveries: mpsc::UnboundedReceiver<Delivered>,
) {
    while let Some(delivered) = deliveries.recv().await {
        match delivered {
            Delivered::Payload { source, payload } => {
                let _ = events.send(NodeEvent::Message { source, payload });
            }
            Delivered::CrdtSync { peer_id, snapshot } => {
                let reply = {
                    let mut optimizer = optimizer.lock().await;
                    let outgoing = optimizer.sync_with_peer(&peer_id, &snapshot);
                    reply_snapshot(&outgoing)
                };

                let replied = !reply.is_empty() && router.send_crdt_update(&peer_id, reply).await;
                debug!(node = %router.node_id(), peer = %peer_id, replied, "peer snapshot reconciled");
                let _ = events.send(NodeEvent::Synced {
                    peer_id,
                    received: snapshot.len(),
                    replied,
                });
            }
        }
    }
    debug!(node = %router.node_id(), "delivery queue closed");
}

/// Wire form of the newest full-state delta per key.
fn reply_snapshot(outgoing: &BTreeMap<String, Vec<CrdtDelta>>) -> BTreeMap<String, Value> {
    let mut reply = BTreeMap::new();
    for (key, deltas) in outgoing {
        let latest = deltas.iter().rev().find_map(|delta| match &delta.operation {
            DeltaOp::Merge(crdt) => Some(SyncEntry {
                crdt: crdt.clone(),
                vector_clock: delta.vector_clock.clone(),
            }),
            _ => None,
        });
        let Some(entry) = latest else { continue };
        match serde_json::to_value(&entry) {
            Ok(value) => {
                reply.insert(key.clone(), value);
            }
            Err(e) => warn!(key = %key, error = %e, "cannot encode reply entry"),
        }
    }
    reply
}
