// SPDX-License-Identifier: BSD-3-Clause
//! Abstract memory objects and the oracle that classifies accesses to them.
//!
//! The analysis never decides on its own which memory an instruction may
//! touch. It asks an [`AliasOracle`], which partitions memory into abstract
//! objects ahead of time. Answers must be deterministic: asking twice about
//! the same instruction has to give the same sets.

use std::collections::BTreeSet;
use std::fmt::Display;

use crate::ir::{FuncId, GlobalId, InstId};

mod unification;
pub use unification::UnificationOracle;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj{}", self.0)
    }
}

pub type ObjectSet = BTreeSet<ObjectId>;

/// Objects an instruction may read or write.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct Access {
    pub reads: ObjectSet,
    pub writes: ObjectSet,
}

impl Access {
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    /// Every object read or written.
    pub fn touched(&self) -> ObjectSet {
        self.reads.union(&self.writes).copied().collect()
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjectKind {
    Stack,
    Heap,
    Global,
    /// Coalesces sites of different kinds
    Mixed,
    /// Caller memory with no visible site
    External,
    Unspecific,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Only for display
    pub caption: String,
    pub kind: ObjectKind,
}

pub trait AliasOracle {
    /// Every object the function may touch.
    fn objects(&self, func: FuncId) -> ObjectSet;

    fn access(&self, func: FuncId, inst: InstId) -> Access;

    fn object_for_allocation(&self, func: FuncId, inst: InstId) -> Option<ObjectId>;

    /// Objects reachable from a pointer parameter at entry.
    fn param_objects(&self, func: FuncId, param: u32) -> ObjectSet;

    /// Objects reachable from any global.
    fn global_objects(&self) -> ObjectSet;

    /// The object holding global `g` itself.
    fn global_object(&self, g: GlobalId) -> ObjectId;

    /// The object a pointer parameter points to at entry, if it points
    /// anywhere.
    fn param_target(&self, func: FuncId, param: u32) -> Option<ObjectId>;

    /// The object that pointers stored in `obj` point to.
    fn contents(&self, obj: ObjectId) -> Option<ObjectId>;

    fn unspecific(&self) -> ObjectId;

    fn info(&self, obj: ObjectId) -> &ObjectInfo;
}
