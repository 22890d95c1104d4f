//! Delta-based replication of a keyed CRDT registry.
//!
//! The optimizer owns the local replicas and answers two questions for the
//! transport layer: what has changed locally since the last exchange, and how
//! a peer's state folds into ours under the configured [`ConflictStrategy`].
//!
//! Change detection is hash based. Each key remembers the content hash of the
//! value it last shipped; [`CrdtSyncOptimizer::generate_deltas`] emits a delta
//! only when the current hash differs, and ticks the node's vector clock for
//! every emitted delta.

use crate::config::SyncConfig;
use crate::delta::{content_hash, CrdtDelta, DeltaOp};
use crate::error::{SyncError, SyncResult};
use crate::metrics::{SyncMetrics, SyncReport};
use crate::strategy::{ConflictStrategy, MergeOutcome};
use crate::vector_clock::VectorClock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, info, warn};
use weave_core::Crdt;

/// One key of a wire snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncEntry {
    pub crdt: Crdt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_clock: Option<VectorClock>,
}

/// A merge the `manual` strategy queued for review.
#[derive(Clone, Debug, PartialEq)]
pub struct ConflictRecord {
    pub key: String,
    pub peer_id: String,
    pub local_clock: Option<VectorClock>,
    pub peer_clock: Option<VectorClock>,
    pub detected_at: DateTime<Utc>,
}

/// Keyed CRDT registry with change tracking and peer reconciliation.
pub struct CrdtSyncOptimizer {
    node_id: String,
    config: SyncConfig,
    crdts: BTreeMap<String, Crdt>,
    /// Content hash of each key as of its last emitted delta or merge.
    last_sync_state: HashMap<String, String>,
    /// Causal history of each key, built from local stamps of that key and
    /// the clocks peers attached to it.
    key_clocks: HashMap<String, VectorClock>,
    vector_clock: VectorClock,
    /// Emitted deltas retained until garbage collection.
    retained: BTreeMap<String, Vec<CrdtDelta>>,
    conflicts: Vec<ConflictRecord>,
    metrics: SyncMetrics,
    last_gc: DateTime<Utc>,
}

impl CrdtSyncOptimizer {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self::with_config(node_id, SyncConfig::default())
    }

    pub fn with_config(node_id: impl Into<String>, config: SyncConfig) -> Self {
        Self {
            node_id: node_id.into(),
            config,
            crdts: BTreeMap::new(),
            last_sync_state: HashMap::new(),
            key_clocks: HashMap::new(),
            vector_clock: VectorClock::new(),
            retained: BTreeMap::new(),
            conflicts: Vec::new(),
            metrics: SyncMetrics::default(),
            last_gc: Utc::now(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start tracking `crdt` under `key`, replacing any previous value.
    ///
    /// The current hash is recorded, so the value as registered is not
    /// reported as a change.
    pub fn register(&mut self, key: impl Into<String>, crdt: Crdt) -> SyncResult<()> {
        let key = key.into();
        let hash = content_hash(&key, &crdt)?;
        debug!(key = %key, kind = %crdt.kind(), "registered CRDT");
        self.last_sync_state.insert(key.clone(), hash);
        self.key_clocks.remove(&key);
        self.crdts.insert(key, crdt);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Crdt> {
        self.crdts.get(key)
    }

    /// Mutable access for local updates; the change is picked up by the
    /// next [`generate_deltas`](Self::generate_deltas).
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Crdt> {
        self.crdts.get_mut(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.crdts.keys()
    }

    pub fn vector_clock(&self) -> &VectorClock {
        &self.vector_clock
    }

    pub fn key_clock(&self, key: &str) -> Option<&VectorClock> {
        self.key_clocks.get(key)
    }

    /// Deltas for `key` since it was last shipped.
    ///
    /// Returns an empty list for unregistered or unchanged keys.
    pub fn generate_deltas(&mut self, key: &str) -> SyncResult<Vec<CrdtDelta>> {
        let Some(crdt) = self.crdts.get(key) else {
            return Ok(Vec::new());
        };

        let hash = content_hash(key, crdt)?;
        if self.last_sync_state.get(key) == Some(&hash) {
            return Ok(Vec::new());
        }

        // Only this node's own entry joins the key's history; peer entries
        // reach a key clock solely through state merged for that key.
        let counter = self.vector_clock.tick(self.node_id.clone());
        let key_clock = self.key_clocks.entry(key.to_string()).or_default();
        key_clock.observe(self.node_id.clone(), counter);

        let delta = CrdtDelta {
            key: key.to_string(),
            operation: DeltaOp::Merge(crdt.clone()),
            timestamp: Utc::now(),
            origin: self.node_id.clone(),
            checksum: hash.clone(),
            vector_clock: self
                .config
                .include_vector_clock
                .then(|| key_clock.clone()),
        };

        self.last_sync_state.insert(key.to_string(), hash);
        self.retained
            .entry(key.to_string())
            .or_default()
            .push(delta.clone());

        Ok(vec![delta])
    }

    /// Full wire snapshot of every registered key.
    ///
    /// Pending local changes are stamped first so the attached clocks cover
    /// them.
    pub fn snapshot(&mut self) -> BTreeMap<String, serde_json::Value> {
        let keys: Vec<String> = self.crdts.keys().cloned().collect();
        for key in &keys {
            if let Err(e) = self.generate_deltas(key) {
                warn!(key = %key, error = %e, "failed to stamp local change");
                self.metrics.serialization_failures += 1;
            }
        }

        let mut out = BTreeMap::new();
        for (key, crdt) in &self.crdts {
            let entry = SyncEntry {
                crdt: crdt.clone(),
                vector_clock: self.key_clocks.get(key).cloned(),
            };
            match serde_json::to_value(&entry) {
                Ok(value) => {
                    out.insert(key.clone(), value);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to serialize snapshot entry");
                    self.metrics.serialization_failures += 1;
                }
            }
        }
        out
    }

    /// Reconcile with a peer's snapshot.
    ///
    /// Local deltas are computed before the peer state is merged, so the
    /// returned map holds only changes the peer may not have. Keys the peer
    /// sends that are not registered locally are ignored; a key that fails
    /// to decode or merge is skipped and counted without affecting the rest.
    pub fn sync_with_peer(
        &mut self,
        peer_id: &str,
        peer_state: &BTreeMap<String, serde_json::Value>,
    ) -> BTreeMap<String, Vec<CrdtDelta>> {
        let started = Instant::now();
        self.metrics.total_syncs += 1;

        let mut local_deltas = BTreeMap::new();
        let keys: Vec<String> = self.crdts.keys().cloned().collect();
        for key in keys {
            match self.generate_deltas(&key) {
                Ok(deltas) if !deltas.is_empty() => {
                    local_deltas.insert(key, deltas);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to generate deltas");
                    self.metrics.serialization_failures += 1;
                }
            }
        }

        let mut failures = 0usize;
        for (key, raw) in peer_state {
            if !self.crdts.contains_key(key) {
                debug!(peer = %peer_id, key = %key, "ignoring unregistered key");
                continue;
            }

            let entry: SyncEntry = match serde_json::from_value(raw.clone()) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(peer = %peer_id, key = %key, error = %e, "undecodable peer state");
                    self.metrics.serialization_failures += 1;
                    failures += 1;
                    continue;
                }
            };

            match self.merge_entry(peer_id, key, &entry) {
                Ok(outcome) => {
                    debug!(peer = %peer_id, key = %key, ?outcome, "merged peer state");
                }
                Err(e) => {
                    warn!(peer = %peer_id, key = %key, error = %e, "merge failed");
                    failures += 1;
                }
            }
        }

        self.metrics.bytes_received += encoded_len(peer_state);
        self.metrics.bytes_sent += encoded_len(&local_deltas);
        if failures == 0 {
            self.metrics.successful_syncs += 1;
        } else {
            self.metrics.failed_syncs += 1;
        }
        self.metrics.sync_duration_ms += started.elapsed().as_secs_f64() * 1000.0;

        if self.config.gc_enabled {
            let now = Utc::now();
            if now - self.last_gc >= self.config.gc_interval_chrono() {
                self.collect_garbage_at(now);
            }
        }

        info!(
            peer = %peer_id,
            received = peer_state.len(),
            outgoing = local_deltas.len(),
            failures,
            "sync complete"
        );

        local_deltas
    }

    fn merge_entry(
        &mut self,
        peer_id: &str,
        key: &str,
        entry: &SyncEntry,
    ) -> SyncResult<MergeOutcome> {
        let crdt = self
            .crdts
            .get_mut(key)
            .ok_or_else(|| SyncError::UnknownKey(key.to_string()))?;

        let outcome = match self.config.strategy {
            ConflictStrategy::LastWriterWins | ConflictStrategy::MergeAll => {
                crdt.merge(&entry.crdt)?;
                MergeOutcome::Merged
            }
            ConflictStrategy::VectorClock => match &entry.vector_clock {
                None => {
                    crdt.merge(&entry.crdt)?;
                    MergeOutcome::Merged
                }
                Some(peer_clock) => {
                    self.vector_clock.update(peer_clock);
                    match self.key_clocks.get(key) {
                        Some(local) if peer_clock.happens_before(local) => {
                            return Ok(MergeOutcome::SkippedStale);
                        }
                        Some(local) if !local.happens_before(peer_clock) && local != peer_clock => {
                            crdt.merge(&entry.crdt)?;
                            MergeOutcome::ConcurrentJoin
                        }
                        _ => {
                            crdt.merge(&entry.crdt)?;
                            MergeOutcome::Advanced
                        }
                    }
                }
            },
            ConflictStrategy::Manual => {
                crdt.merge(&entry.crdt)?;
                warn!(peer = %peer_id, key = %key, "conflict flagged for review");
                self.conflicts.push(ConflictRecord {
                    key: key.to_string(),
                    peer_id: peer_id.to_string(),
                    local_clock: self.key_clocks.get(key).cloned(),
                    peer_clock: entry.vector_clock.clone(),
                    detected_at: Utc::now(),
                });
                self.metrics.conflicts_resolved += 1;
                MergeOutcome::Flagged
            }
        };

        if let Some(peer_clock) = &entry.vector_clock {
            self.key_clocks
                .entry(key.to_string())
                .or_default()
                .update(peer_clock);
        }

        // The merged value is known to both sides now.
        let merged = self
            .crdts
            .get(key)
            .ok_or_else(|| SyncError::UnknownKey(key.to_string()))?;
        let hash = content_hash(key, merged)?;
        self.last_sync_state.insert(key.to_string(), hash);

        Ok(outcome)
    }

    /// Apply one delta to a registered key.
    pub fn apply_delta(&mut self, key: &str, delta: &CrdtDelta) -> SyncResult<()> {
        let result = self.apply_delta_inner(key, delta);
        match &result {
            Ok(()) => self.metrics.deltas_applied += 1,
            Err(e) => {
                debug!(key = %key, op = %delta.operation, error = %e, "delta rejected");
                self.metrics.deltas_rejected += 1;
            }
        }
        result
    }

    fn apply_delta_inner(&mut self, key: &str, delta: &CrdtDelta) -> SyncResult<()> {
        let crdt = self
            .crdts
            .get_mut(key)
            .ok_or_else(|| SyncError::UnknownKey(key.to_string()))?;

        match (&delta.operation, &mut *crdt) {
            (DeltaOp::Set(value), Crdt::Register(reg)) => {
                let ts = delta.timestamp.timestamp_millis().max(0) as u64;
                reg.set(value.clone(), ts, delta.origin.clone());
            }
            (DeltaOp::Increment(amount), Crdt::Counter(counter)) => {
                counter.increment(delta.origin.clone(), *amount);
            }
            (DeltaOp::Add(value), Crdt::Set(set)) => {
                set.add(&delta.origin, value.clone());
            }
            (DeltaOp::Remove(value), Crdt::Set(set)) => {
                set.remove(value);
            }
            (DeltaOp::Merge(state), crdt) => {
                crdt.merge(state)?;
            }
            (op, crdt) => {
                return Err(SyncError::OperationMismatch {
                    operation: op.name().to_string(),
                    kind: crdt.kind(),
                })
            }
        }

        if let Some(clock) = &delta.vector_clock {
            self.vector_clock.update(clock);
            self.key_clocks
                .entry(key.to_string())
                .or_default()
                .update(clock);
        }

        // A merged-in remote state is not a local change to re-ship.
        if matches!(delta.operation, DeltaOp::Merge(_)) {
            if let Some(crdt) = self.crdts.get(key) {
                let hash = content_hash(key, crdt)?;
                self.last_sync_state.insert(key.to_string(), hash);
            }
        }

        Ok(())
    }

    /// Apply deltas grouped by key; returns how many succeeded.
    pub fn batch_apply_deltas(&mut self, deltas: &BTreeMap<String, Vec<CrdtDelta>>) -> usize {
        let mut applied = 0;
        for (key, list) in deltas {
            for delta in list {
                if self.apply_delta(key, delta).is_ok() {
                    applied += 1;
                }
            }
        }
        applied
    }

    /// Deltas still retained for `key`.
    pub fn retained_deltas(&self, key: &str) -> &[CrdtDelta] {
        self.retained.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drain the conflicts queued by the `manual` strategy.
    pub fn take_conflicts(&mut self) -> Vec<ConflictRecord> {
        std::mem::take(&mut self.conflicts)
    }

    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    pub fn get_metrics(&self) -> SyncReport {
        self.metrics.report()
    }

    /// Drop retained deltas older than the configured TTL.
    pub fn run_garbage_collection(&mut self) -> usize {
        self.collect_garbage_at(Utc::now())
    }

    pub(crate) fn collect_garbage_at(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = self.config.gc_ttl();
        let mut removed = 0;

        self.retained.retain(|_, deltas| {
            let before = deltas.len();
            deltas.retain(|d| d.age(now) < ttl);
            removed += before - deltas.len();
            !deltas.is_empty()
        });

        self.last_gc = now;
        self.metrics.deltas_collected += removed as u64;
        if removed > 0 {
            info!(removed, "garbage collected deltas");
        }
        removed
    }
}

fn encoded_len<T: Serialize>(value: &T) -> u64 {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfigBuilder;

    fn counter_node(node: &str, amount: u64) -> CrdtSyncOptimizer {
        let mut opt = CrdtSyncOptimizer::new(node);
        opt.register("hits", Crdt::counter()).unwrap();
        opt.get_mut("hits")
            .and_then(Crdt::as_counter_mut)
            .unwrap()
            .increment(node, amount);
        opt
    }

    #[test]
    fn test_generate_deltas_only_on_change() {
        let mut opt = CrdtSyncOptimizer::new("a");
        opt.register("hits", Crdt::counter()).unwrap();
        assert!(opt.generate_deltas("hits").unwrap().is_empty());

        opt.get_mut("hits")
            .and_then(Crdt::as_counter_mut)
            .unwrap()
            .increment("a", 1);

        let deltas = opt.generate_deltas("hits").unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].origin, "a");
        assert_eq!(deltas[0].checksum.len(), crate::delta::CHECKSUM_LEN);
        assert_eq!(opt.vector_clock().get("a"), 1);

        assert!(opt.generate_deltas("hits").unwrap().is_empty());
        assert_eq!(opt.vector_clock().get("a"), 1);
        assert!(opt.generate_deltas("missing").unwrap().is_empty());
    }

    #[test]
    fn test_vector_clock_omitted_when_disabled() {
        let config = SyncConfigBuilder::new().include_vector_clock(false).build();
        let mut opt = CrdtSyncOptimizer::with_config("a", config);
        opt.register("hits", Crdt::counter()).unwrap();
        opt.get_mut("hits")
            .and_then(Crdt::as_counter_mut)
            .unwrap()
            .increment("a", 1);

        let deltas = opt.generate_deltas("hits").unwrap();
        assert!(deltas[0].vector_clock.is_none());
    }

    #[test]
    fn test_garbage_collection_respects_ttl() {
        let config = SyncConfigBuilder::new().gc_ttl(60).build();
        let mut opt = CrdtSyncOptimizer::with_config("a", config);
        opt.register("hits", Crdt::counter()).unwrap();
        opt.get_mut("hits")
            .and_then(Crdt::as_counter_mut)
            .unwrap()
            .increment("a", 1);
        opt.generate_deltas("hits").unwrap();
        assert_eq!(opt.retained_deltas("hits").len(), 1);

        let now = Utc::now();
        assert_eq!(opt.collect_garbage_at(now), 0);
        assert_eq!(opt.retained_deltas("hits").len(), 1);

        assert_eq!(opt.collect_garbage_at(now + chrono::Duration::seconds(61)), 1);
        assert!(opt.retained_deltas("hits").is_empty());
        assert_eq!(opt.metrics().deltas_collected, 1);
    }

    #[test]
    fn test_sync_counts_undecodable_key() {
        let mut a = counter_node("a", 1);
        a.register("name", Crdt::register()).unwrap();

        let mut b = counter_node("b", 2);
        let mut peer = b.snapshot();
        peer.insert("name".to_string(), serde_json::json!({"crdt": 42}));

        a.sync_with_peer("b", &peer);
        assert_eq!(a.get("hits").unwrap().value(), weave_core::CrdtValue::Counter(3));
        assert_eq!(a.metrics().serialization_failures, 1);
        assert_eq!(a.metrics().failed_syncs, 1);
    }

    #[test]
    fn test_manual_strategy_queues_conflict() {
        let config = SyncConfigBuilder::new()
            .strategy(ConflictStrategy::Manual)
            .build();
        let mut a = CrdtSyncOptimizer::with_config("a", config);
        a.register("hits", Crdt::counter()).unwrap();

        let mut b = counter_node("b", 4);
        a.sync_with_peer("b", &b.snapshot());

        let conflicts = a.take_conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].key, "hits");
        assert_eq!(conflicts[0].peer_id, "b");
        assert!(a.take_conflicts().is_empty());
        assert_eq!(a.get("hits").unwrap().value(), weave_core::CrdtValue::Counter(4));
    }
}
