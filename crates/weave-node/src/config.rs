//! Node configuration.
//!
//! A [`NodeConfig`] bundles the router and replication settings for one
//! node. Every field except `node_id` has a default, so a JSON document
//! only needs to name what it changes:
//!
//! ```
//! use weave_node::NodeConfig;
//!
//! let config = NodeConfig::from_json_str(
//!     r#"{"node_id": "relay-1", "router": {"default_ttl": 8}}"#,
//! ).unwrap();
//! assert_eq!(config.router.default_ttl, 8);
//! assert_eq!(config.router.route_timeout_ms, 60_000);
//! ```

use crate::error::{NodeError, NodeResult};
use serde::{Deserialize, Serialize};
use weave_routing::RouterConfig;
use weave_sync::SyncConfig;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl NodeConfig {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            router: RouterConfig::default(),
            sync: SyncConfig::default(),
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> NodeResult<Self> {
        let config: NodeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> NodeResult<()> {
        if self.node_id.trim().is_empty() {
            return Err(NodeError::InvalidConfig("node_id is empty".to_string()));
        }
        if self.router.default_ttl == 0 {
            return Err(NodeError::InvalidConfig(
                "router.default_ttl must be at least 1".to_string(),
            ));
        }
        if self.router.seen_capacity == 0 {
            return Err(NodeError::InvalidConfig(
                "router.seen_capacity must be at least 1".to_string(),
            ));
        }
        if self.sync.gc_enabled && self.sync.gc_interval_secs == 0 {
            return Err(NodeError::InvalidConfig(
                "sync.gc_interval_secs must be non-zero when gc is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for node configuration.
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            config: NodeConfig::new(node_id),
        }
    }

    pub fn router(mut self, router: RouterConfig) -> Self {
        self.config.router = router;
        self
    }

    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.config.sync = sync;
        self
    }

    pub fn build(self) -> NodeResult<NodeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_routing::RouterConfigBuilder;
    use weave_sync::{ConflictStrategy, SyncConfigBuilder};

    #[test]
    fn test_minimal_json_takes_defaults() {
        let config = NodeConfig::from_json_str(r#"{"node_id": "a"}"#).unwrap();
        assert_eq!(config, NodeConfig::new("a"));
    }

    #[test]
    fn test_json_overrides() {
        let config = NodeConfig::from_json_str(
            r#"{
                "node_id": "b",
                "router": {"hello_interval_ms": 2000, "discovery_timeout_ms": 750},
                "sync": {"strategy": "vector_clock", "gc_enabled": false}
            }"#,
        )
        .unwrap();

        assert_eq!(config.router.hello_interval_ms, Some(2000));
        assert_eq!(config.router.discovery_timeout_ms, 750);
        assert_eq!(config.router.default_ttl, 16);
        assert_eq!(config.sync.strategy, ConflictStrategy::VectorClock);
        assert!(!config.sync.gc_enabled);
    }

    #[test]
    fn test_rejects_bad_documents() {
        assert!(matches!(
            NodeConfig::from_json_str("{not json"),
            Err(NodeError::ConfigParse(_))
        ));
        assert!(matches!(
            NodeConfig::from_json_str(r#"{"router": {}}"#),
            Err(NodeError::ConfigParse(_))
        ));
        assert!(matches!(
            NodeConfig::from_json_str(r#"{"node_id": "  "}"#),
            Err(NodeError::InvalidConfig(_))
        ));
        assert!(matches!(
            NodeConfig::from_json_str(r#"{"node_id": "a", "router": {"default_ttl": 0}}"#),
            Err(NodeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_builder() {
        let config = NodeConfigBuilder::new("relay")
            .router(RouterConfigBuilder::new().default_ttl(4).build())
            .sync(SyncConfigBuilder::new().gc_enabled(false).build())
            .build()
            .unwrap();

        assert_eq!(config.node_id, "relay");
        assert_eq!(config.router.default_ttl, 4);
        assert!(!config.sync.gc_enabled);
    }
}
