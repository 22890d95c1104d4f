//! Property-based tests that MUST pass for all CRDT implementations
//!
//! These tests verify the lattice laws that guarantee convergence:
//!  - Commutativity: a ⊔ b = b ⊔ a
//!  - Associativity: (a ⊔ b) ⊔ c = a ⊔ (b ⊔ c)
//!  - Idempotence:  a ⊔ a = a
//!  - Bottom is identity: a ⊔ ⊥ = a

use proptest::prelude::*;
use weave_core::gcounter::GCounter;
use weave_core::lattice::Lattice;
use weave_core::lwwreg::LwwRegister;
use weave_core::orset::OrSet;
use weave_core::Crdt;

/// Generate strategies for prop-testing

fn orset_strategy() -> impl Strategy<Value = OrSet<String>> {
    (
        prop::collection::vec("[a-e]{1,2}", 0..10),
        prop::collection::vec("[a-e]{1,2}", 0..4),
    )
        .prop_map(|(adds, removes)| {
            let mut set = OrSet::new();
            for (i, e) in adds.iter().enumerate() {
                set.add(&format!("replica{}", i % 3), e.clone());
            }
            for e in removes {
                set.remove(&e);
            }
            set
        })
}

fn gcounter_strategy() -> impl Strategy<Value = GCounter> {
    prop::collection::btree_map("[a-d]", 0u64..100, 0..4).prop_map(|entries| {
        let mut counter = GCounter::new();
        for (node, amount) in entries {
            counter.increment(node, amount);
        }
        counter
    })
}

fn lwwreg_strategy() -> impl Strategy<Value = LwwRegister<String>> {
    ("[a-z]{0,4}", 0u64..20, "[a-c]").prop_map(|(value, timestamp, writer)| {
        let mut reg = LwwRegister::new();
        reg.set(value, timestamp, writer);
        reg
    })
}

// ============================================================================
// OrSet Property Tests
// ============================================================================

proptest! {
    #[test]
    fn orset_join_is_commutative(
        a in orset_strategy(),
        b in orset_strategy()
    ) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn orset_join_is_associative(
        a in orset_strategy(),
        b in orset_strategy(),
        c in orset_strategy()
    ) {
        let left = a.join(&b).join(&c);
        let right = a.join(&b.join(&c));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn orset_join_is_idempotent(a in orset_strategy()) {
        prop_assert_eq!(a.join(&a), a);
    }

    #[test]
    fn orset_bottom_is_identity(a in orset_strategy()) {
        let bottom = OrSet::bottom();
        prop_assert_eq!(a.join(&bottom), a.clone());
        prop_assert_eq!(bottom.join(&a), a);
    }

    #[test]
    fn orset_value_convergence(
        a in orset_strategy(),
        b in orset_strategy()
    ) {
        prop_assert_eq!(a.join(&b).value(), b.join(&a).value());
    }
}

// ============================================================================
// GCounter Property Tests
// ============================================================================

proptest! {
    #[test]
    fn gcounter_join_is_commutative(
        a in gcounter_strategy(),
        b in gcounter_strategy()
    ) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn gcounter_join_is_associative(
        a in gcounter_strategy(),
        b in gcounter_strategy(),
        c in gcounter_strategy()
    ) {
        let left = a.join(&b).join(&c);
        let right = a.join(&b.join(&c));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn gcounter_join_is_idempotent(a in gcounter_strategy()) {
        prop_assert_eq!(a.join(&a).value(), a.value());
        prop_assert_eq!(a.join(&a), a);
    }

    #[test]
    fn gcounter_bottom_is_identity(a in gcounter_strategy()) {
        let bottom = GCounter::bottom();
        prop_assert_eq!(a.join(&bottom), a.clone());
        prop_assert_eq!(bottom.join(&a), a);
    }
}

// ============================================================================
// LwwRegister Property Tests
// ============================================================================

proptest! {
    #[test]
    fn lwwreg_join_is_commutative(
        a in lwwreg_strategy(),
        b in lwwreg_strategy()
    ) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn lwwreg_join_is_associative(
        a in lwwreg_strategy(),
        b in lwwreg_strategy(),
        c in lwwreg_strategy()
    ) {
        let left = a.join(&b).join(&c);
        let right = a.join(&b.join(&c));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn lwwreg_join_is_idempotent(a in lwwreg_strategy()) {
        prop_assert_eq!(a.join(&a), a);
    }

    #[test]
    fn lwwreg_join_picks_later_write(
        a in lwwreg_strategy(),
        b in lwwreg_strategy()
    ) {
        let joined = a.join(&b);
        let expected = if (a.timestamp(), a.writer_id()) > (b.timestamp(), b.writer_id()) {
            a.timestamp()
        } else {
            b.timestamp()
        };
        prop_assert_eq!(joined.timestamp(), expected);
    }
}

// ============================================================================
// Crdt enum
// ============================================================================

proptest! {
    #[test]
    fn crdt_merge_value_is_order_independent(
        a in gcounter_strategy(),
        b in gcounter_strategy()
    ) {
        let mut left = Crdt::from(a.clone());
        left.merge(&Crdt::from(b.clone())).unwrap();
        let mut right = Crdt::from(b);
        right.merge(&Crdt::from(a)).unwrap();
        prop_assert_eq!(left.value(), right.value());
    }
}

// ============================================================================
// Serialization Round-Trip Tests
// ============================================================================

#[test]
fn orset_serialization_roundtrip() {
    let mut set = OrSet::new();
    set.add("replica1", "hello".to_string());
    set.add("replica2", "world".to_string());
    set.remove(&"hello".to_string());

    let serialized = serde_json::to_string(&set).unwrap();
    let deserialized: OrSet<String> = serde_json::from_str(&serialized).unwrap();

    assert_eq!(set, deserialized);
}

#[test]
fn crdt_serialization_roundtrip() {
    let mut counter = GCounter::new();
    counter.increment("replica1", 42);
    let crdt = Crdt::from(counter);

    let serialized = serde_json::to_string(&crdt).unwrap();
    let deserialized: Crdt = serde_json::from_str(&serialized).unwrap();

    assert_eq!(crdt, deserialized);
}
