//! Integration tests for delta replication.
//!
//! These tests verify:
//! - Two replicas of each value type converge after one exchange
//! - The vector-clock strategy ignores causally stale peer state
//! - Key clocks only carry history of their own key
//! - Batch application counts only deltas that apply
//! - Peer keys that are unknown locally are ignored

use proptest::prelude::*;
use std::collections::BTreeMap;
use weave_core::{Crdt, CrdtValue};
use weave_sync::{
    ConflictStrategy, CrdtDelta, CrdtSyncOptimizer, DeltaOp, SyncConfigBuilder, VectorClock,
};

fn replica(node: &str, strategy: ConflictStrategy) -> CrdtSyncOptimizer {
    let config = SyncConfigBuilder::new().strategy(strategy).build();
    let mut opt = CrdtSyncOptimizer::with_config(node, config);
    opt.register("hits", Crdt::counter()).unwrap();
    opt.register("tags", Crdt::set()).unwrap();
    opt.register("title", Crdt::register()).unwrap();
    opt
}

fn bump(opt: &mut CrdtSyncOptimizer, amount: u64) {
    let node = opt.node_id().to_string();
    opt.get_mut("hits")
        .and_then(Crdt::as_counter_mut)
        .unwrap()
        .increment(node, amount);
}

/// One full round: `a` merges `b`'s snapshot, `b` applies what `a` sends back.
fn exchange(a: &mut CrdtSyncOptimizer, b: &mut CrdtSyncOptimizer) -> usize {
    let snapshot = b.snapshot();
    let back = a.sync_with_peer(b.node_id(), &snapshot);
    b.batch_apply_deltas(&back)
}

#[test]
fn test_counters_converge_to_sum() {
    let mut x = replica("x", ConflictStrategy::LastWriterWins);
    let mut y = replica("y", ConflictStrategy::LastWriterWins);
    bump(&mut x, 5);
    bump(&mut y, 3);

    let applied = exchange(&mut x, &mut y);
    assert_eq!(applied, 1);

    assert_eq!(x.get("hits").unwrap().value(), CrdtValue::Counter(8));
    assert_eq!(y.get("hits").unwrap().value(), CrdtValue::Counter(8));
    assert_eq!(x.metrics().successful_syncs, 1);
    assert!(x.metrics().bytes_received > 0);
    assert!(x.metrics().bytes_sent > 0);
}

#[test]
fn test_sets_and_registers_converge() {
    let mut x = replica("x", ConflictStrategy::MergeAll);
    let mut y = replica("y", ConflictStrategy::MergeAll);

    x.get_mut("tags")
        .and_then(Crdt::as_set_mut)
        .unwrap()
        .add("x", "red".to_string());
    y.get_mut("tags")
        .and_then(Crdt::as_set_mut)
        .unwrap()
        .add("y", "blue".to_string());
    x.get_mut("title")
        .and_then(Crdt::as_register_mut)
        .unwrap()
        .set("draft".to_string(), 10, "x");
    y.get_mut("title")
        .and_then(Crdt::as_register_mut)
        .unwrap()
        .set("final".to_string(), 20, "y");

    exchange(&mut x, &mut y);

    for opt in [&x, &y] {
        assert_eq!(
            opt.get("title").unwrap().value(),
            CrdtValue::Register(Some("final".to_string()))
        );
        assert_eq!(
            opt.get("tags").unwrap().value(),
            CrdtValue::Set(["blue".to_string(), "red".to_string()].into())
        );
    }
}

#[test]
fn test_second_exchange_is_quiet() {
    let mut x = replica("x", ConflictStrategy::LastWriterWins);
    let mut y = replica("y", ConflictStrategy::LastWriterWins);
    bump(&mut x, 1);
    bump(&mut y, 1);

    exchange(&mut x, &mut y);
    let snapshot = y.snapshot();
    let back = x.sync_with_peer("y", &snapshot);
    assert!(back.is_empty());
}

#[test]
fn test_vector_clock_skips_stale_state() {
    let mut x = replica("x", ConflictStrategy::VectorClock);
    let mut y = replica("y", ConflictStrategy::VectorClock);

    bump(&mut y, 1);
    let stale = y.snapshot();

    exchange(&mut x, &mut y);
    assert_eq!(x.get("hits").unwrap().value(), CrdtValue::Counter(1));

    // x moves on past y's state.
    bump(&mut x, 10);
    x.snapshot();
    let before = x.get("hits").cloned();

    // A forged stale payload with a bigger value must be ignored.
    let mut forged = stale;
    let mut entry = forged["hits"].clone();
    entry["crdt"]["state"]["counts"]["y"] = serde_json::json!(500);
    forged.insert("hits".to_string(), entry);

    x.sync_with_peer("y", &forged);
    assert_eq!(x.get("hits").cloned(), before);
}

#[test]
fn test_vector_clock_joins_concurrent_state() {
    let mut x = replica("x", ConflictStrategy::VectorClock);
    let mut y = replica("y", ConflictStrategy::VectorClock);
    bump(&mut x, 2);
    x.snapshot();
    bump(&mut y, 3);

    exchange(&mut x, &mut y);
    assert_eq!(x.get("hits").unwrap().value(), CrdtValue::Counter(5));
    assert_eq!(x.vector_clock().get("y"), 1);
}

#[test]
fn test_partial_reply_does_not_mask_other_keys() {
    let mut a = replica("a", ConflictStrategy::VectorClock);
    let mut b = replica("b", ConflictStrategy::VectorClock);

    // b stamps hits but only ever ships tags to a.
    bump(&mut b, 1);
    b.snapshot();
    b.get_mut("tags")
        .and_then(Crdt::as_set_mut)
        .unwrap()
        .add("b", "blue".to_string());
    let mut partial = b.snapshot();
    partial.retain(|key, _| key == "tags");
    a.sync_with_peer("b", &partial);
    assert_eq!(a.vector_clock().get("b"), 2);
    assert_eq!(a.key_clock("hits"), None);

    bump(&mut a, 5);
    let from_a = a.snapshot();
    assert_eq!(a.key_clock("hits").unwrap().get("b"), 0);
    b.sync_with_peer("a", &from_a);
    let from_b = b.snapshot();
    a.sync_with_peer("b", &from_b);

    assert_eq!(b.get("hits").unwrap().value(), CrdtValue::Counter(6));
    assert_eq!(a.get("hits").unwrap().value(), CrdtValue::Counter(6));
    assert_eq!(a.key_clock("hits"), b.key_clock("hits"));
}

#[test]
fn test_batch_apply_counts_successes() {
    let mut opt = replica("x", ConflictStrategy::LastWriterWins);

    let mut batch: BTreeMap<String, Vec<CrdtDelta>> = BTreeMap::new();
    batch.insert(
        "hits".to_string(),
        vec![
            CrdtDelta::op("hits", "peer", DeltaOp::Increment(4)),
            CrdtDelta::op("hits", "peer", DeltaOp::Add("nope".to_string())),
        ],
    );
    batch.insert(
        "tags".to_string(),
        vec![
            CrdtDelta::op("tags", "peer", DeltaOp::Add("a".to_string())),
            CrdtDelta::op("tags", "peer", DeltaOp::Add("b".to_string())),
            CrdtDelta::op("tags", "peer", DeltaOp::Remove("a".to_string())),
        ],
    );
    batch.insert(
        "title".to_string(),
        vec![CrdtDelta::op("title", "peer", DeltaOp::Set("hello".to_string()))],
    );
    batch.insert(
        "missing".to_string(),
        vec![CrdtDelta::op("missing", "peer", DeltaOp::Increment(1))],
    );

    assert_eq!(opt.batch_apply_deltas(&batch), 5);
    assert_eq!(opt.metrics().deltas_applied, 5);
    assert_eq!(opt.metrics().deltas_rejected, 2);

    assert_eq!(opt.get("hits").unwrap().value(), CrdtValue::Counter(4));
    assert_eq!(
        opt.get("tags").unwrap().value(),
        CrdtValue::Set(["b".to_string()].into())
    );
    assert_eq!(
        opt.get("title").unwrap().value(),
        CrdtValue::Register(Some("hello".to_string()))
    );
}

#[test]
fn test_merge_delta_kind_mismatch_rejected() {
    let mut opt = replica("x", ConflictStrategy::LastWriterWins);
    let delta = CrdtDelta::op("hits", "peer", DeltaOp::Merge(Crdt::set()));
    assert!(opt.apply_delta("hits", &delta).is_err());
    assert_eq!(opt.get("hits").unwrap().value(), CrdtValue::Counter(0));
}

#[test]
fn test_unregistered_peer_keys_ignored() {
    let mut x = CrdtSyncOptimizer::new("x");
    x.register("hits", Crdt::counter()).unwrap();
    let mut y = replica("y", ConflictStrategy::LastWriterWins);
    bump(&mut y, 2);

    x.sync_with_peer("y", &y.snapshot());
    assert!(x.get("tags").is_none());
    assert_eq!(x.get("hits").unwrap().value(), CrdtValue::Counter(2));
    assert_eq!(x.metrics().failed_syncs, 0);
}

#[test]
fn test_delta_clock_advances_local_clock() {
    let mut opt = replica("x", ConflictStrategy::VectorClock);
    let mut delta = CrdtDelta::op("hits", "peer", DeltaOp::Increment(1));
    delta.vector_clock = Some(VectorClock::from_entries([("peer".to_string(), 7)]));

    opt.apply_delta("hits", &delta).unwrap();
    assert_eq!(opt.vector_clock().get("peer"), 7);
    assert_eq!(opt.key_clock("hits").unwrap().get("peer"), 7);
}

proptest! {
    #[test]
    fn prop_counter_exchange_sums(a in 1u64..1000, b in 1u64..1000) {
        let mut x = replica("x", ConflictStrategy::MergeAll);
        let mut y = replica("y", ConflictStrategy::MergeAll);
        bump(&mut x, a);
        bump(&mut y, b);

        exchange(&mut x, &mut y);
        prop_assert_eq!(x.get("hits").unwrap().value(), CrdtValue::Counter(a + b));
        prop_assert_eq!(x.get("hits"), y.get("hits"));
    }
}
