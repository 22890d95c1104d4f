//! # weave-node
//!
//! A Meshweave node: a [`MeshRouter`](weave_routing::MeshRouter) for
//! reaching peers over multiple hops and a
//! [`CrdtSyncOptimizer`](weave_sync::CrdtSyncOptimizer) replica that
//! converges with them by exchanging snapshots over the mesh.
//!
//! - [`node`] - the node itself and its events
//! - [`config`] - JSON-loadable node settings
//! - [`logging`] - `tracing` subscriber setup
//! - [`error`] - error types
//!
//! ```rust,no_run
//! use weave_core::Crdt;
//! use weave_node::{MeshNode, NodeConfig};
//! use weave_routing::MemoryNetwork;
//!
//! # async fn demo() -> weave_node::NodeResult<()> {
//! let net = MemoryNetwork::new();
//! let a = MeshNode::join(&net, NodeConfig::new("a"))?;
//! let b = MeshNode::join(&net, NodeConfig::new("b"))?;
//! net.link("a", "b");
//! a.add_neighbor("b");
//! b.add_neighbor("a");
//! a.start()?;
//! b.start()?;
//!
//! for node in [&a, &b] {
//!     node.register("hits", Crdt::counter()).await?;
//! }
//! a.increment("hits", 3).await?;
//! a.replicate_to("b").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod node;

pub use config::{NodeConfig, NodeConfigBuilder};
pub use error::{NodeError, NodeResult};
pub use node::{MeshNode, NodeEvent};
