//! # weave-routing
//!
//! Reactive, AODV-style multi-hop routing for the Meshweave mesh.
//!
//! This crate provides:
//! - A bit-exact packet codec (length-prefixed JSON header plus raw payload)
//! - A multipath route table with sequence-number freshness and expiry
//! - On-demand route discovery by flooding route requests
//! - Hop-by-hop forwarding with route-error propagation on link failure
//! - Counters and derived health ratios
//!
//! The link layer and the local application are injected as the
//! [`Transport`] and [`Delivery`] traits. [`MemoryNetwork`] wires routers
//! together in-process for tests and simulation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weave_routing::{ChannelDelivery, MemoryNetwork, MeshRouter, RouterConfig};
//!
//! let net = MemoryNetwork::new();
//! let (transport, inbound) = net.join("a");
//! let (delivery, events) = ChannelDelivery::new();
//!
//! let router = Arc::new(MeshRouter::new("a", RouterConfig::default(), transport, Arc::new(delivery)));
//! router.spawn_receiver(inbound);
//! router.start();
//!
//! router.add_neighbor("b");
//! router.send("b", b"hi".to_vec()).await;
//! ```

pub mod config;
mod discovery;
pub mod error;
mod forwarding;
pub mod packet;
pub mod route_table;
pub mod router;
pub mod seen;
pub mod stats;
pub mod transport;

pub use config::{RouterConfig, RouterConfigBuilder};
pub use error::{RoutingError, RoutingResult};
pub use packet::{PacketBody, PacketHeader, PacketKind, RouteReply, RoutingPacket};
pub use route_table::{RouteEntry, RouteTable, RouteUpdate};
pub use router::MeshRouter;
pub use seen::SeenSet;
pub use stats::{HealthMetrics, RouterStats, StatsSnapshot};
pub use transport::{
    ChannelDelivery, Delivered, Delivery, Frame, MemoryNetwork, MemoryTransport, Transport,
    TransportError,
};
