// SPDX-License-Identifier: BSD-3-Clause
//! Static single assignment over abstract memory objects.
//!
//! Construction follows the classic recipe, keyed by object instead of by
//! variable: merges go at the iterated dominance frontier of each object's
//! def blocks (the entry counts as one), then a walk over the dominator tree
//! renames uses to their reaching defs. Every def is a may-def, so it also
//! uses the version it overwrites.
//!
//! Afterwards, versions are collapsed by congruence: two stores of the same
//! value through the same pointer over congruent versions write congruent
//! versions, and a control-flow merge whose incoming versions are congruent
//! is trivial. Uses of a trivial merge are redirected to its incoming defs,
//! so a join where every predecessor agrees ends up without a merge.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use rustc_hash::FxHashMap;

use crate::ir::cfg::Cfg;
use crate::ir::{BlockId, FuncId, Function, InstId, Opcode, Operand};
use crate::oracle::{Access, AliasOracle, ObjectId, ObjectSet};
use crate::union::EqClass;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct MergeId(pub u32);

impl Display for MergeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum MergeKind {
    Join { block: BlockId, object: ObjectId },
    CallReturn { call: InstId, object: ObjectId },
    /// Callers' views of the objects reachable from a pointer parameter
    ArgIncoming { param: u32 },
    /// Callers' views of the objects reachable from globals
    Globals,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Merge {
    pub kind: MergeKind,
    /// `(object, predecessor def)` per incoming edge
    pub incoming: Vec<(ObjectId, Def)>,
    /// Set once congruence shows all incoming versions agree
    pub trivial: bool,
}

/// Where a memory version comes from.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Def {
    /// Live on entry and not covered by an entry merge
    Entry,
    Inst(InstId),
    Merge(MergeId),
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Use {
    Inst(InstId),
    Merge(MergeId),
}

type Version = (ObjectId, Def);

/// Objects an instruction reads and writes, as the memory SSA sees them.
///
/// Loads and stores through pointers the oracle cannot classify touch the
/// unspecific object.
pub(crate) fn classify(
    func: FuncId,
    f: &Function,
    i: InstId,
    oracle: &dyn AliasOracle,
) -> Access {
    let unspecific = || ObjectSet::from([oracle.unspecific()]);
    match &f.instruction(i).opcode {
        Opcode::Alloc { .. } => Access {
            reads: ObjectSet::new(),
            writes: oracle
                .object_for_allocation(func, i)
                .map(|o| ObjectSet::from([o]))
                .unwrap_or_else(unspecific),
        },
        Opcode::Load { .. } => {
            let mut a = oracle.access(func, i);
            if a.reads.is_empty() {
                a.reads = unspecific();
            }
            a
        }
        Opcode::Store { .. } => {
            let mut a = oracle.access(func, i);
            if a.writes.is_empty() {
                a.writes = unspecific();
            }
            a
        }
        Opcode::Call { .. } => oracle.access(func, i),
        Opcode::Ret { .. } => oracle.access(func, i),
        // No `_` pattern to ensure this is updated if the type changes
        Opcode::Cast { .. } => Access::default(),
        Opcode::Phi { .. } => Access::default(),
        Opcode::Select { .. } => Access::default(),
        Opcode::Opaque => Access::default(),
        Opcode::Br { .. } => Access::default(),
        Opcode::Unreachable => Access::default(),
        Opcode::Other => Access::default(),
    }
}

/// Instructions that start a new version of the objects they write. Calls
/// do too, through their call-return merges.
fn defines(op: &Opcode) -> bool {
    matches!(op, Opcode::Store { .. } | Opcode::Alloc { .. })
}

#[derive(Clone, Debug)]
pub struct MemorySsa {
    pub objects: ObjectSet,
    /// Indexed by [`InstId`], empty for unreachable instructions
    pub accesses: Vec<Access>,
    pub merges: Vec<Merge>,
    joins: BTreeMap<BlockId, Vec<MergeId>>,
    call_returns: BTreeMap<InstId, Vec<MergeId>>,
    entry_merges: Vec<MergeId>,
    /// After congruence, trivial merges resolved away
    reaching: BTreeMap<(Use, ObjectId), Vec<Def>>,
    users: BTreeMap<Def, BTreeSet<Use>>,
}

impl MemorySsa {
    pub fn new(func: FuncId, f: &Function, cfg: &Cfg, oracle: &dyn AliasOracle) -> Self {
        let _span = tracing::trace_span!("memssa", function = %f.name).entered();

        let mut accesses = vec![Access::default(); f.instrs.len()];
        let mut objects = oracle.objects(func);
        for &b in cfg.rpo() {
            for &i in &f.block(b).instrs {
                let a = classify(func, f, i, oracle);
                objects.extend(a.touched());
                accesses[i.index()] = a;
            }
        }

        let mut ssa = MemorySsa {
            objects: ObjectSet::new(),
            accesses,
            merges: Vec::new(),
            joins: BTreeMap::new(),
            call_returns: BTreeMap::new(),
            entry_merges: Vec::new(),
            reaching: BTreeMap::new(),
            users: BTreeMap::new(),
        };

        // Entry merges, chained in order: parameters, then globals
        let mut stacks: FxHashMap<ObjectId, Vec<Def>> = FxHashMap::default();
        for p in f.pointer_params() {
            let objs = oracle.param_objects(func, p);
            objects.extend(objs.iter().copied());
            let m = ssa.add_merge(MergeKind::ArgIncoming { param: p });
            ssa.entry_merges.push(m);
            for o in objs {
                let prev = Self::top(&stacks, o);
                ssa.merges[m.0 as usize].incoming.push((o, prev));
                stacks.entry(o).or_default().push(Def::Merge(m));
            }
        }
        let m = ssa.add_merge(MergeKind::Globals);
        ssa.entry_merges.push(m);
        for o in oracle.global_objects().intersection(&objects) {
            let prev = Self::top(&stacks, *o);
            ssa.merges[m.0 as usize].incoming.push((*o, prev));
            stacks.entry(*o).or_default().push(Def::Merge(m));
        }
        ssa.objects = objects;

        ssa.place(f, cfg);
        ssa.rename(f, cfg, stacks);
        ssa.prune(f, cfg);
        ssa.resolve();
        tracing::trace!(
            "{} objects, {} merges ({} trivial)",
            ssa.objects.len(),
            ssa.merges.len(),
            ssa.merges.iter().filter(|m| m.trivial).count()
        );
        ssa
    }

    fn add_merge(&mut self, kind: MergeKind) -> MergeId {
        let id = MergeId(self.merges.len() as u32);
        self.merges.push(Merge {
            kind,
            incoming: Vec::new(),
            trivial: false,
        });
        id
    }

    fn top(stacks: &FxHashMap<ObjectId, Vec<Def>>, o: ObjectId) -> Def {
        stacks
            .get(&o)
            .and_then(|s| s.last().copied())
            .unwrap_or(Def::Entry)
    }

    /// Create join merges at iterated dominance frontiers, and one
    /// call-return merge per object a call writes.
    fn place(&mut self, f: &Function, cfg: &Cfg) {
        let mut def_blocks: BTreeMap<ObjectId, BTreeSet<BlockId>> = self
            .objects
            .iter()
            .map(|o| (*o, BTreeSet::from([f.entry()])))
            .collect();
        for &b in cfg.rpo() {
            for &i in &f.block(b).instrs {
                let op = &f.instruction(i).opcode;
                if defines(op) || matches!(op, Opcode::Call { .. }) {
                    for o in &self.accesses[i.index()].writes {
                        def_blocks.entry(*o).or_default().insert(b);
                    }
                }
            }
        }

        let df = cfg.frontiers();
        for (o, blocks) in def_blocks {
            for b in cfg.iterated_frontier(&df, blocks) {
                let m = self.add_merge(MergeKind::Join {
                    block: b,
                    object: o,
                });
                self.joins.entry(b).or_default().push(m);
            }
        }

        for &b in cfg.rpo() {
            for &i in &f.block(b).instrs {
                if let Opcode::Call { .. } = f.instruction(i).opcode {
                    let writes: Vec<ObjectId> =
                        self.accesses[i.index()].writes.iter().copied().collect();
                    for o in writes {
                        let m = self.add_merge(MergeKind::CallReturn {
                            call: i,
                            object: o,
                        });
                        self.call_returns.entry(i).or_default().push(m);
                    }
                }
            }
        }
    }

    fn merge_object(&self, m: MergeId) -> Option<ObjectId> {
        match self.merges[m.0 as usize].kind {
            MergeKind::Join { object, .. } => Some(object),
            MergeKind::CallReturn { object, .. } => Some(object),
            MergeKind::ArgIncoming { .. } => None,
            MergeKind::Globals => None,
        }
    }

    fn rename(&mut self, f: &Function, cfg: &Cfg, mut stacks: FxHashMap<ObjectId, Vec<Def>>) {
        enum Step {
            Enter(BlockId),
            Exit(Vec<ObjectId>),
        }

        let entry = f.entry();
        // A loop back to the entry block joins with the function's start
        for m in self.joins.get(&entry).cloned().unwrap_or_default() {
            if let Some(o) = self.merge_object(m) {
                let prev = Self::top(&stacks, o);
                self.merges[m.0 as usize].incoming.push((o, prev));
            }
        }

        let children = cfg.dom_children();
        let mut raw: BTreeMap<(Use, ObjectId), Def> = BTreeMap::new();
        let mut steps = vec![Step::Enter(entry)];
        while let Some(step) = steps.pop() {
            let b = match step {
                Step::Exit(pushed) => {
                    for o in pushed {
                        if let Some(s) = stacks.get_mut(&o) {
                            s.pop();
                        }
                    }
                    continue;
                }
                Step::Enter(b) => b,
            };

            let mut pushed = Vec::new();
            for m in self.joins.get(&b).cloned().unwrap_or_default() {
                if let Some(o) = self.merge_object(m) {
                    stacks.entry(o).or_default().push(Def::Merge(m));
                    pushed.push(o);
                }
            }

            for &i in &f.block(b).instrs {
                let access = &self.accesses[i.index()];
                for o in access.touched() {
                    raw.insert((Use::Inst(i), o), Self::top(&stacks, o));
                }
                let op = &f.instruction(i).opcode;
                if defines(op) {
                    for o in access.writes.iter().copied() {
                        stacks.entry(o).or_default().push(Def::Inst(i));
                        pushed.push(o);
                    }
                } else if let Opcode::Call { .. } = op {
                    for m in self.call_returns.get(&i).cloned().unwrap_or_default() {
                        if let Some(o) = self.merge_object(m) {
                            let prev = Self::top(&stacks, o);
                            self.merges[m.0 as usize].incoming = vec![(o, prev), (o, Def::Inst(i))];
                            stacks.entry(o).or_default().push(Def::Merge(m));
                            pushed.push(o);
                        }
                    }
                }
            }

            for &s in cfg.succs_of(b) {
                for m in self.joins.get(&s).cloned().unwrap_or_default() {
                    if let Some(o) = self.merge_object(m) {
                        let prev = Self::top(&stacks, o);
                        self.merges[m.0 as usize].incoming.push((o, prev));
                    }
                }
            }

            steps.push(Step::Exit(pushed));
            for &c in children[b.index()].iter().rev() {
                steps.push(Step::Enter(c));
            }
        }

        // Stash the unresolved reaching defs; `resolve` rewrites them
        self.reaching = raw.into_iter().map(|(k, d)| (k, vec![d])).collect();
    }

    fn raw_reaching(&self, i: InstId, o: ObjectId) -> Def {
        self.reaching
            .get(&(Use::Inst(i), o))
            .and_then(|ds| ds.first().copied())
            .unwrap_or(Def::Entry)
    }

    /// Collapse congruent versions until nothing changes.
    fn prune(&mut self, f: &Function, cfg: &Cfg) {
        let mut versions: EqClass<Version> = EqClass::new();
        let stores: Vec<(InstId, Operand, Operand)> = cfg
            .rpo()
            .iter()
            .flat_map(|b| f.block(*b).instrs.iter().copied())
            .filter_map(|i| match f.instruction(i).opcode {
                Opcode::Store { pointer, value } => Some((i, pointer, value)),
                _ => None,
            })
            .collect();

        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;

            let mut seen: FxHashMap<(ObjectId, Operand, Operand, Version), Version> =
                FxHashMap::default();
            for (i, pointer, value) in &stores {
                for o in self.accesses[i.index()].writes.iter().copied() {
                    let prior = versions.find((o, self.raw_reaching(*i, o)));
                    let this = (o, Def::Inst(*i));
                    match seen.get(&(o, *pointer, *value, prior)) {
                        Some(other) => changed |= versions.union(*other, this).1,
                        None => {
                            seen.insert((o, *pointer, *value, prior), this);
                        }
                    }
                }
            }

            for idx in 0..self.merges.len() {
                let merge = &self.merges[idx];
                let object = match merge.kind {
                    MergeKind::Join { object, .. } => object,
                    MergeKind::CallReturn { .. } => continue,
                    MergeKind::ArgIncoming { .. } => continue,
                    MergeKind::Globals => continue,
                };
                if merge.trivial {
                    continue;
                }
                let this = (object, Def::Merge(MergeId(idx as u32)));
                let me = versions.find(this);
                let distinct: BTreeSet<Version> = merge
                    .incoming
                    .iter()
                    .map(|v| versions.find(*v))
                    .filter(|v| *v != me)
                    .collect();
                if distinct.len() <= 1 {
                    self.merges[idx].trivial = true;
                    if let Some(v) = distinct.first() {
                        versions.union(*v, this);
                    }
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
        tracing::trace!("congruence stable after {} rounds", rounds);
    }

    /// Expand defs that went through trivial merges, and build the users.
    fn resolve(&mut self) {
        fn expand(merges: &[Merge], d: Def, o: ObjectId, seen: &mut BTreeSet<Def>, out: &mut BTreeSet<Def>) {
            if !seen.insert(d) {
                return;
            }
            match d {
                Def::Merge(m) if merges[m.0 as usize].trivial => {
                    for (o2, d2) in &merges[m.0 as usize].incoming {
                        if *o2 == o {
                            expand(merges, *d2, o, seen, out);
                        }
                    }
                }
                _ => {
                    out.insert(d);
                }
            }
        }

        let mut reaching: BTreeMap<(Use, ObjectId), Vec<Def>> = BTreeMap::new();
        let mut uses: Vec<((Use, ObjectId), Def)> = self
            .reaching
            .iter()
            .flat_map(|(k, ds)| ds.iter().map(move |d| (*k, *d)))
            .collect();
        for (idx, m) in self.merges.iter().enumerate() {
            if m.trivial {
                continue;
            }
            for (o, d) in &m.incoming {
                uses.push(((Use::Merge(MergeId(idx as u32)), *o), *d));
            }
        }
        for ((u, o), d) in uses {
            let mut out = BTreeSet::new();
            expand(&self.merges, d, o, &mut BTreeSet::new(), &mut out);
            let defs = reaching.entry((u, o)).or_default();
            for d in out {
                if !defs.contains(&d) {
                    defs.push(d);
                }
            }
        }

        let mut users: BTreeMap<Def, BTreeSet<Use>> = BTreeMap::new();
        for ((u, _), ds) in &reaching {
            for d in ds {
                users.entry(*d).or_default().insert(*u);
            }
        }
        self.reaching = reaching;
        self.users = users;
    }

    #[inline]
    pub fn merge(&self, m: MergeId) -> &Merge {
        &self.merges[m.0 as usize]
    }

    /// Merges that survived congruence.
    pub fn live_merges(&self) -> impl Iterator<Item = MergeId> + '_ {
        (0..self.merges.len())
            .map(|i| MergeId(i as u32))
            .filter(|m| !self.merge(*m).trivial)
    }

    /// Live join merges at the start of a block.
    pub fn joins_at(&self, b: BlockId) -> Vec<MergeId> {
        self.joins
            .get(&b)
            .map(|ms| ms.iter().copied().filter(|m| !self.merge(*m).trivial).collect())
            .unwrap_or_default()
    }

    pub fn call_returns(&self, call: InstId) -> &[MergeId] {
        self.call_returns.get(&call).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Argument-incoming merges in parameter order, then the globals merge.
    pub fn entry_merges(&self) -> &[MergeId] {
        &self.entry_merges
    }

    /// The defs of `o` that reach `u`.
    pub fn reaching(&self, u: Use, o: ObjectId) -> &[Def] {
        self.reaching.get(&(u, o)).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every `(object, defs)` pair reaching a use.
    pub fn uses(&self, u: Use) -> impl Iterator<Item = (ObjectId, &[Def])> + '_ {
        self.reaching
            .range((u, ObjectId(0))..=(u, ObjectId(u32::MAX)))
            .map(|((_, o), ds)| (*o, ds.as_slice()))
    }

    pub fn users(&self, d: Def) -> impl Iterator<Item = Use> + '_ {
        self.users.get(&d).into_iter().flatten().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Module;
    use crate::oracle::UnificationOracle;
    use crate::signatures::Signatures;

    fn build(json: &str) -> (Module, MemorySsa) {
        let m = Module::from_json(json).unwrap();
        let o = UnificationOracle::new(&m, &Signatures::default());
        let f = &m.functions[0];
        let cfg = Cfg::new(f);
        let ssa = MemorySsa::new(crate::ir::FuncId(0), f, &cfg, &o);
        (m, ssa)
    }

    fn diamond(then_value: &str, else_value: &str) -> String {
        format!(
            r#"{{"globals": [{{"name": "a"}}, {{"name": "b"}}],
                "functions": [{{"name": "f", "returns_pointer": true, "blocks": [
                  {{"name": "entry", "instructions": [
                    {{"name": "s", "op": "alloca"}},
                    {{"op": "br", "targets": ["then", "else"]}}]}},
                  {{"name": "then", "instructions": [
                    {{"op": "store", "pointer": "%s", "value": "{}"}},
                    {{"op": "br", "targets": ["join"]}}]}},
                  {{"name": "else", "instructions": [
                    {{"op": "store", "pointer": "%s", "value": "{}"}},
                    {{"op": "br", "targets": ["join"]}}]}},
                  {{"name": "join", "instructions": [
                    {{"name": "x", "op": "load", "pointer": "%s"}},
                    {{"op": "ret", "value": "%x"}}]}}
                ]}}]}}"#,
            then_value, else_value
        )
    }

    #[test]
    fn agreeing_branches_need_no_merge() {
        let (m, ssa) = build(&diamond("@a", "@a"));
        let f = &m.functions[0];
        let join = BlockId(3);
        assert!(ssa.joins_at(join).is_empty());
        // The load sees both stores directly
        let load = f.find_instruction("x").unwrap();
        let obj = *ssa.accesses[load.index()].reads.iter().next().unwrap();
        let defs = ssa.reaching(Use::Inst(load), obj);
        assert_eq!(defs.len(), 2);
        assert!(defs.iter().all(|d| matches!(d, Def::Inst(_))));
    }

    #[test]
    fn differing_branches_merge() {
        let (m, ssa) = build(&diamond("@a", "@b"));
        let f = &m.functions[0];
        let join = BlockId(3);
        let merges = ssa.joins_at(join);
        assert_eq!(merges.len(), 1);
        let merge = ssa.merge(merges[0]);
        assert_eq!(merge.incoming.len(), 2);
        let load = f.find_instruction("x").unwrap();
        let obj = *ssa.accesses[load.index()].reads.iter().next().unwrap();
        assert_eq!(ssa.reaching(Use::Inst(load), obj), &[Def::Merge(merges[0])]);
        assert!(ssa
            .users(Def::Merge(merges[0]))
            .any(|u| u == Use::Inst(load)));
    }

    #[test]
    fn entry_merges_per_pointer_param() {
        let (_, ssa) = build(
            r#"{"functions": [{"name": "f",
                  "params": [{"name": "p"}, {"name": "n", "pointer": false}, {"name": "q"}],
                  "blocks": [{"name": "entry", "instructions": [
                    {"name": "x", "op": "load", "pointer": "%p"},
                    {"op": "store", "pointer": "%q", "value": "%x"},
                    {"op": "ret"}]}]}]}"#,
        );
        let kinds: Vec<MergeKind> = ssa
            .entry_merges()
            .iter()
            .map(|m| ssa.merge(*m).kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                MergeKind::ArgIncoming { param: 0 },
                MergeKind::ArgIncoming { param: 2 },
                MergeKind::Globals
            ]
        );
        // The load of %p reads what the first parameter's merge defines
        let arg0 = ssa.entry_merges()[0];
        assert!(ssa
            .uses(Use::Inst(InstId(0)))
            .all(|(_, ds)| ds == [Def::Merge(arg0)]));
    }

    #[test]
    fn loop_carried_store_merges_at_header() {
        let (m, ssa) = build(
            r#"{"globals": [{"name": "a"}],
                "functions": [{"name": "f", "blocks": [
                  {"name": "entry", "instructions": [
                    {"name": "s", "op": "alloca"},
                    {"op": "br", "targets": ["head"]}]},
                  {"name": "head", "instructions": [
                    {"name": "x", "op": "load", "pointer": "%s"},
                    {"op": "br", "targets": ["body", "exit"]}]},
                  {"name": "body", "instructions": [
                    {"op": "store", "pointer": "%s", "value": "@a"},
                    {"op": "br", "targets": ["head"]}]},
                  {"name": "exit", "instructions": [{"op": "ret"}]},
                  {"name": "dead", "instructions": [
                    {"op": "store", "pointer": "%s", "value": "null"},
                    {"op": "br", "targets": ["head"]}]}
                ]}]}"#,
        );
        let f = &m.functions[0];
        assert_eq!(ssa.joins_at(BlockId(1)).len(), 1);
        assert!(ssa.joins_at(BlockId(4)).is_empty());
        let dead_store = f.block(BlockId(4)).instrs[0];
        assert!(ssa.accesses[dead_store.index()].is_empty());
        assert!(ssa.users(Def::Inst(dead_store)).next().is_none());
    }
}
