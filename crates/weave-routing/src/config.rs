//! Router settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a mesh router.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Initial TTL of originated packets.
    pub default_ttl: u32,
    /// Age after which a route is treated as absent (in milliseconds).
    pub route_timeout_ms: u64,
    /// How long a discovery waits for a route reply (in milliseconds).
    pub discovery_timeout_ms: u64,
    /// Maximum number of remembered packet ids.
    pub seen_capacity: usize,
    /// HELLO beacon period; no beacon when unset (in milliseconds).
    pub hello_interval_ms: Option<u64>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_ttl: 16,
            route_timeout_ms: 60_000,
            discovery_timeout_ms: 5_000,
            seen_capacity: 4096,
            hello_interval_ms: None,
        }
    }
}

impl RouterConfig {
    pub fn route_timeout(&self) -> Duration {
        Duration::from_millis(self.route_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn hello_interval(&self) -> Option<Duration> {
        self.hello_interval_ms.map(Duration::from_millis)
    }
}

/// Builder for router configuration.
pub struct RouterConfigBuilder {
    config: RouterConfig,
}

impl RouterConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RouterConfig::default(),
        }
    }

    pub fn default_ttl(mut self, ttl: u32) -> Self {
        self.config.default_ttl = ttl;
        self
    }

    pub fn route_timeout(mut self, ms: u64) -> Self {
        self.config.route_timeout_ms = ms;
        self
    }

    pub fn discovery_timeout(mut self, ms: u64) -> Self {
        self.config.discovery_timeout_ms = ms;
        self
    }

    pub fn seen_capacity(mut self, capacity: usize) -> Self {
        self.config.seen_capacity = capacity;
        self
    }

    pub fn hello_interval(mut self, ms: u64) -> Self {
        self.config.hello_interval_ms = Some(ms);
        self
    }

    pub fn build(self) -> RouterConfig {
        self.config
    }
}

impl Default for RouterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
