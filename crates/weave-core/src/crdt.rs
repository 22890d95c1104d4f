//! A closed sum over the replicated value types.
//!
//! Registries and wire snapshots need to hold heterogeneous values under one
//! key space. [`Crdt`] carries one of the three types; merging two values of
//! different kinds is rejected rather than coerced.

use crate::gcounter::GCounter;
use crate::lattice::Lattice;
use crate::lwwreg::LwwRegister;
use crate::orset::OrSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Discriminant of a [`Crdt`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrdtKind {
    Register,
    Counter,
    Set,
}

impl fmt::Display for CrdtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrdtKind::Register => write!(f, "register"),
            CrdtKind::Counter => write!(f, "counter"),
            CrdtKind::Set => write!(f, "set"),
        }
    }
}

/// Attempted to merge values of two different kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot merge {found} into {expected}")]
pub struct KindMismatch {
    pub expected: CrdtKind,
    pub found: CrdtKind,
}

/// One replicated value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "state", rename_all = "snake_case")]
pub enum Crdt {
    Register(LwwRegister<String>),
    Counter(GCounter),
    Set(OrSet<String>),
}

/// Observable projection of a [`Crdt`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CrdtValue {
    Register(Option<String>),
    Counter(u64),
    Set(BTreeSet<String>),
}

impl Crdt {
    pub fn register() -> Self {
        Crdt::Register(LwwRegister::new())
    }

    pub fn counter() -> Self {
        Crdt::Counter(GCounter::new())
    }

    pub fn set() -> Self {
        Crdt::Set(OrSet::new())
    }

    pub fn kind(&self) -> CrdtKind {
        match self {
            Crdt::Register(_) => CrdtKind::Register,
            Crdt::Counter(_) => CrdtKind::Counter,
            Crdt::Set(_) => CrdtKind::Set,
        }
    }

    /// Merge `other` into `self`.
    pub fn merge(&mut self, other: &Crdt) -> Result<(), KindMismatch> {
        match (self, other) {
            (Crdt::Register(a), Crdt::Register(b)) => a.merge(b),
            (Crdt::Counter(a), Crdt::Counter(b)) => a.merge(b),
            (Crdt::Set(a), Crdt::Set(b)) => a.merge(b),
            (this, other) => {
                return Err(KindMismatch {
                    expected: this.kind(),
                    found: other.kind(),
                })
            }
        }
        Ok(())
    }

    pub fn value(&self) -> CrdtValue {
        match self {
            Crdt::Register(r) => CrdtValue::Register(r.value()),
            Crdt::Counter(c) => CrdtValue::Counter(c.value()),
            Crdt::Set(s) => CrdtValue::Set(s.value()),
        }
    }

    pub fn as_register_mut(&mut self) -> Option<&mut LwwRegister<String>> {
        match self {
            Crdt::Register(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_counter_mut(&mut self) -> Option<&mut GCounter> {
        match self {
            Crdt::Counter(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_set_mut(&mut self) -> Option<&mut OrSet<String>> {
        match self {
            Crdt::Set(s) => Some(s),
            _ => None,
        }
    }
}

impl From<LwwRegister<String>> for Crdt {
    fn from(value: LwwRegister<String>) -> Self {
        Crdt::Register(value)
    }
}

impl From<GCounter> for Crdt {
    fn from(value: GCounter) -> Self {
        Crdt::Counter(value)
    }
}

impl From<OrSet<String>> for Crdt {
    fn from(value: OrSet<String>) -> Self {
        Crdt::Set(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_same_kind() {
        let mut a = Crdt::counter();
        a.as_counter_mut().unwrap().increment("a", 2);
        let mut b = Crdt::counter();
        b.as_counter_mut().unwrap().increment("b", 3);

        a.merge(&b).unwrap();
        assert_eq!(a.value(), CrdtValue::Counter(5));
    }

    #[test]
    fn test_merge_kind_mismatch() {
        let mut a = Crdt::counter();
        let err = a.merge(&Crdt::set()).unwrap_err();
        assert_eq!(err.expected, CrdtKind::Counter);
        assert_eq!(err.found, CrdtKind::Set);
    }

    #[test]
    fn test_wire_representation() {
        let mut reg = Crdt::register();
        reg.as_register_mut().unwrap().set("hi".to_string(), 3, "n1");

        let json = serde_json::to_value(&reg).unwrap();
        assert_eq!(json["type"], "register");
        assert_eq!(json["state"]["value"], "hi");

        let back: Crdt = serde_json::from_value(json).unwrap();
        assert_eq!(back, reg);
    }
}
