//! Link-layer and application seams, plus an in-memory mesh for tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Link-layer send failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Peer unreachable: {0}")]
    Unreachable(String),
    #[error("Link closed: {0}")]
    Closed(String),
}

/// Sends encoded frames to a direct neighbour.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, bytes: Vec<u8>, next_hop: &str) -> Result<(), TransportError>;
}

/// Receives what the router delivers locally.
#[async_trait]
pub trait Delivery: Send + Sync + 'static {
    /// Application payload addressed to this node.
    async fn on_receive(&self, source: &str, payload: Vec<u8>);

    /// Replication snapshot addressed to this node.
    async fn on_crdt_sync(&self, peer_id: &str, snapshot: BTreeMap<String, serde_json::Value>) {
        debug!(peer = %peer_id, keys = snapshot.len(), "crdt sync ignored");
    }
}

/// Something the router handed to the local node.
#[derive(Clone, Debug, PartialEq)]
pub enum Delivered {
    Payload {
        source: String,
        payload: Vec<u8>,
    },
    CrdtSync {
        peer_id: String,
        snapshot: BTreeMap<String, serde_json::Value>,
    },
}

/// [`Delivery`] that queues everything on a channel.
pub struct ChannelDelivery {
    tx: mpsc::UnboundedSender<Delivered>,
}

impl ChannelDelivery {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivered>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Delivery for ChannelDelivery {
    async fn on_receive(&self, source: &str, payload: Vec<u8>) {
        let _ = self.tx.send(Delivered::Payload {
            source: source.to_string(),
            payload,
        });
    }

    async fn on_crdt_sync(&self, peer_id: &str, snapshot: BTreeMap<String, serde_json::Value>) {
        let _ = self.tx.send(Delivered::CrdtSync {
            peer_id: peer_id.to_string(),
            snapshot,
        });
    }
}

/// An encoded packet as it arrives from a neighbour.
#[derive(Clone, Debug)]
pub struct Frame {
    pub from: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct NetworkInner {
    inboxes: HashMap<String, mpsc::UnboundedSender<Frame>>,
    links: HashSet<(String, String)>,
}

fn link_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// In-memory radio medium: frames only cross explicit bidirectional links.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<RwLock<NetworkInner>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node; returns its transport and inbound frame queue.
    pub fn join(
        &self,
        node_id: impl Into<String>,
    ) -> (Arc<MemoryTransport>, mpsc::UnboundedReceiver<Frame>) {
        let node_id = node_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().inboxes.insert(node_id.clone(), tx);
        let transport = MemoryTransport {
            local_id: node_id,
            network: self.clone(),
        };
        (Arc::new(transport), rx)
    }

    /// Detach a node; frames to it fail from now on.
    pub fn leave(&self, node_id: &str) {
        let mut inner = self.inner.write();
        inner.inboxes.remove(node_id);
        inner.links.retain(|(a, b)| a != node_id && b != node_id);
    }

    pub fn link(&self, a: &str, b: &str) {
        self.inner.write().links.insert(link_key(a, b));
    }

    pub fn unlink(&self, a: &str, b: &str) {
        self.inner.write().links.remove(&link_key(a, b));
    }

    pub fn is_linked(&self, a: &str, b: &str) -> bool {
        self.inner.read().links.contains(&link_key(a, b))
    }

    fn deliver(&self, from: &str, to: &str, bytes: Vec<u8>) -> Result<(), TransportError> {
        let inbox = {
            let inner = self.inner.read();
            if !inner.links.contains(&link_key(from, to)) {
                return Err(TransportError::Unreachable(to.to_string()));
            }
            inner.inboxes.get(to).cloned()
        };

        let inbox = inbox.ok_or_else(|| TransportError::Unreachable(to.to_string()))?;
        inbox
            .send(Frame {
                from: from.to_string(),
                bytes,
            })
            .map_err(|_| TransportError::Closed(to.to_string()))
    }
}

/// One node's handle on a [`MemoryNetwork`].
pub struct MemoryTransport {
    local_id: String,
    network: MemoryNetwork,
}

impl MemoryTransport {
    pub fn local_id(&self) -> &str {
        &self.local_id
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, bytes: Vec<u8>, next_hop: &str) -> Result<(), TransportError> {
        self.network.deliver(&self.local_id, next_hop, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_links_only() {
        let net = MemoryNetwork::new();
        let (a, _a_rx) = net.join("a");
        let (_b, mut b_rx) = net.join("b");
        let (_c, _c_rx) = net.join("c");

        assert_eq!(
            a.send(b"x".to_vec(), "b").await,
            Err(TransportError::Unreachable("b".into()))
        );

        net.link("a", "b");
        a.send(b"x".to_vec(), "b").await.unwrap();
        let frame = b_rx.recv().await.unwrap();
        assert_eq!(frame.from, "a");
        assert_eq!(frame.bytes, b"x");

        assert!(a.send(b"x".to_vec(), "c").await.is_err());

        net.unlink("b", "a");
        assert!(!net.is_linked("a", "b"));
        assert!(a.send(b"x".to_vec(), "b").await.is_err());
    }

    #[tokio::test]
    async fn test_closed_inbox() {
        let net = MemoryNetwork::new();
        let (a, _a_rx) = net.join("a");
        let (_b, b_rx) = net.join("b");
        net.link("a", "b");
        drop(b_rx);

        assert_eq!(
            a.send(b"x".to_vec(), "b").await,
            Err(TransportError::Closed("b".into()))
        );
    }

    #[tokio::test]
    async fn test_channel_delivery() {
        let (delivery, mut rx) = ChannelDelivery::new();
        delivery.on_receive("a", b"hi".to_vec()).await;
        assert_eq!(
            rx.recv().await,
            Some(Delivered::Payload {
                source: "a".into(),
                payload: b"hi".to_vec()
            })
        );
    }
}
