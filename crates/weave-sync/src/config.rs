//! Replication settings.

use crate::strategy::ConflictStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Configuration for the sync optimizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Conflict-resolution strategy, fixed for the optimizer's lifetime.
    pub strategy: ConflictStrategy,
    /// Attach a vector clock snapshot to generated deltas.
    pub include_vector_clock: bool,
    /// Enable delta garbage collection.
    pub gc_enabled: bool,
    /// Retention window for deltas (in seconds).
    pub gc_ttl_secs: u64,
    /// How often the background sweep runs (in seconds).
    pub gc_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            strategy: ConflictStrategy::LastWriterWins,
            include_vector_clock: true,
            gc_enabled: true,
            gc_ttl_secs: 7 * SECS_PER_DAY,
            gc_interval_secs: 60 * 60,
        }
    }
}

impl SyncConfig {
    pub fn gc_ttl(&self) -> chrono::Duration {
        clamped_seconds(self.gc_ttl_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub(crate) fn gc_interval_chrono(&self) -> chrono::Duration {
        clamped_seconds(self.gc_interval_secs)
    }
}

// chrono durations panic past roughly i64::MAX milliseconds.
fn clamped_seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(u32::MAX as u64) as i64)
}

/// Builder for sync configuration.
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn include_vector_clock(mut self, enabled: bool) -> Self {
        self.config.include_vector_clock = enabled;
        self
    }

    pub fn gc_enabled(mut self, enabled: bool) -> Self {
        self.config.gc_enabled = enabled;
        self
    }

    pub fn gc_ttl(mut self, secs: u64) -> Self {
        self.config.gc_ttl_secs = secs;
        self
    }

    pub fn gc_interval(mut self, secs: u64) -> Self {
        self.config.gc_interval_secs = secs;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
