// File: `crates/weave-core/src/lib.rs`
pub mod crdt;
pub mod gcounter;
pub mod lattice;
pub mod lwwreg;
pub mod orset;

pub use crdt::{Crdt, CrdtKind, CrdtValue, KindMismatch};
