// SPDX-License-Identifier: BSD-3-Clause
//! Sparse, flow-sensitive points-to solving for a single function.
//!
//! Facts flow along the def-use graph: each node's state is the join of its
//! predecessors' states, transformed by the node. Joins only ever union
//! classes, so states grow monotonically and the worklist empties.

use std::collections::{BTreeMap, BTreeSet};

use triomphe::Arc;

use super::dug::{DefUseGraph, Node};
use super::graph::{DataOut, PointsToGraph};
use super::memssa::{self, MemorySsa, MergeKind};
use super::pointer::Options;
use super::resource::{Resource, Root, Site};
use super::summary::{CallSite, Summary};
use super::Error;
use crate::ir::cfg::Cfg;
use crate::ir::{AllocKind, Callee, FuncId, Function, GlobalId, InstId, Module, Opcode, Operand};
use crate::oracle::{AliasOracle, ObjectId};

/// How a call site finds the summary of its callee, given the number of
/// arguments at the call.
pub type Lookup<'a> = dyn Fn(&Callee, usize) -> Arc<Summary> + 'a;

/// Everything known about a solved function.
#[derive(Clone, Debug)]
pub struct FunctionSolution {
    pub func: FuncId,
    pub memssa: MemorySsa,
    pub dug: DefUseGraph,
    outs: Vec<DataOut>,
    /// Join of the states at every return
    pub exit: PointsToGraph,
    /// Join of every node's state
    merged: PointsToGraph,
    /// Target of the returned value, in `exit`
    pub ret: Option<Resource>,
    pub passes: usize,
    /// Distinct classes among parameters, allocation sites and globals after
    /// each pass
    pub class_history: Vec<usize>,
}

impl FunctionSolution {
    pub fn out(&self, n: Node) -> Option<&DataOut> {
        self.dug.index_of(n).map(|idx| &self.outs[idx])
    }

    /// State after `inst`, `None` if it is unreachable.
    pub fn state_at(&self, inst: InstId) -> Option<&PointsToGraph> {
        self.out(Node::Inst(inst)).map(|o| &o.state)
    }

    /// Leader of the class `inst`'s result points to, in the state right
    /// after it.
    pub fn points_to(&self, inst: InstId) -> Option<Resource> {
        self.out(Node::Inst(inst)).and_then(DataOut::target)
    }

    fn resource_of(&self, f: &Function, op: Operand) -> Option<Resource> {
        match op {
            Operand::Local(i) => self.out(Node::Inst(i)).and_then(|o| o.val),
            Operand::Param(p) => f
                .params
                .get(p as usize)
                .filter(|param| param.pointer)
                .map(|_| Resource::param(p, 0)),
            Operand::Global(g) => Some(Resource::global(g)),
            // No `_` pattern to ensure this is updated if the type changes
            Operand::Function(_) => None,
            Operand::Decl(_) => None,
            Operand::Null => None,
            Operand::Undef => None,
        }
    }

    /// Leader of the class `op` points to, over the whole function.
    pub fn class_of(&self, f: &Function, op: Operand) -> Option<Resource> {
        self.resource_of(f, op).map(|r| self.merged.find(r))
    }

    /// Leader of the class `op` points to, in the state right after `at`.
    pub fn class_at(&self, f: &Function, at: InstId, op: Operand) -> Option<Resource> {
        let state = self.state_at(at)?;
        self.resource_of(f, op).map(|r| state.find(r))
    }

    pub fn may_alias(&self, f: &Function, a: Operand, b: Operand) -> bool {
        match (self.class_of(f, a), self.class_of(f, b)) {
            (Some(x), Some(y)) => x == y || x.is_unspecific() || y.is_unspecific(),
            _ => false,
        }
    }
}

struct Solver<'a> {
    func: FuncId,
    f: &'a Function,
    module: &'a Module,
    dug: &'a DefUseGraph,
    opts: &'a Options,
    lookup: &'a Lookup<'a>,
    globals: Vec<GlobalId>,
    /// Entry-block stack allocations, when the entry block is not a loop
    /// header
    single_stack: BTreeSet<InstId>,
    kinds: Vec<MergeKind>,
    /// What holds on entry, before any instruction runs
    entry: PointsToGraph,
    outs: Vec<DataOut>,
}

impl<'a> Solver<'a> {
    fn target(&self, state: &mut PointsToGraph, op: Operand) -> Option<Resource> {
        let r = match op {
            Operand::Local(j) => self
                .dug
                .index_of(Node::Inst(j))
                .and_then(|k| self.outs[k].val),
            Operand::Param(p) => self
                .f
                .params
                .get(p as usize)
                .filter(|param| param.pointer)
                .map(|_| Resource::param(p, 0)),
            Operand::Global(g) => Some(Resource::global(g)),
            // No `_` pattern to ensure this is updated if the type changes
            Operand::Function(_) => None,
            Operand::Decl(_) => None,
            Operand::Null => None,
            Operand::Undef => None,
        }?;
        state.insert(r);
        Some(state.find(r))
    }

    /// Whether the class of `t` stands for exactly one run-time location.
    fn is_single(&self, state: &PointsToGraph, t: Resource) -> bool {
        if !state.is_singleton(t) {
            return false;
        }
        match state.find(t) {
            Resource::Site(Site::Global(_)) => true,
            Resource::Site(Site::Alloc { func, inst }) => {
                func == self.func && self.single_stack.contains(&inst)
            }
            // No `_` pattern to ensure this is updated if the type changes
            Resource::Unspecific => false,
            Resource::Globals => false,
            Resource::Incoming { .. } => false,
            Resource::Fresh => false,
        }
    }

    fn unify_all(
        &self,
        state: &mut PointsToGraph,
        ops: impl IntoIterator<Item = Operand>,
    ) -> Option<Resource> {
        let mut val: Option<Resource> = None;
        for op in ops {
            if let Some(t) = self.target(state, op) {
                match val {
                    None => val = Some(t),
                    Some(v) => {
                        state.union(v, t);
                    }
                }
            }
        }
        val
    }

    fn transfer(&self, node: Node, mut state: PointsToGraph) -> DataOut {
        let depth = self.opts.incoming_depth;
        let val = match node {
            Node::ArgPhi(p) => {
                state.join(&self.entry);
                let r = Resource::param(p, 0);
                state.insert(r);
                Some(r)
            }
            Node::ObjectPhi(m) => {
                match self.kinds[m.0 as usize] {
                    MergeKind::ArgIncoming { .. } => {
                        state.join(&self.entry);
                    }
                    MergeKind::Globals => {
                        state.join(&self.entry);
                    }
                    // No `_` pattern to ensure this is updated if the type changes
                    MergeKind::Join { .. } => (),
                    MergeKind::CallReturn { .. } => (),
                }
                None
            }
            Node::Inst(i) => match &self.f.instruction(i).opcode {
                Opcode::Alloc { .. } => {
                    let r = Resource::alloc(self.func, i);
                    state.insert(r);
                    Some(r)
                }
                Opcode::Load { pointer } => match self.target(&mut state, *pointer) {
                    Some(t) => state.deref(t, depth),
                    // Not known to point anywhere yet
                    None if is_local(*pointer) => None,
                    None => {
                        state.insert(Resource::Unspecific);
                        Some(Resource::Unspecific)
                    }
                },
                Opcode::Store { pointer, value } => {
                    let v = self.target(&mut state, *value);
                    match (self.target(&mut state, *pointer), v) {
                        (Some(t), Some(v)) => {
                            if self.opts.strong_updates && self.is_single(&state, t) {
                                state.strong_update(t, v);
                            } else {
                                match state.deref(t, depth) {
                                    Some(d) => {
                                        state.union(d, v);
                                    }
                                    None => {
                                        state.add_edge(t, v);
                                    }
                                }
                            }
                        }
                        (None, Some(_)) if is_local(*pointer) => (),
                        // Stored somewhere unknown, so anything may read it
                        (None, Some(v)) => {
                            state.union(v, Resource::Unspecific);
                        }
                        (_, None) => (),
                    }
                    None
                }
                Opcode::Cast { operand } => self.target(&mut state, *operand),
                Opcode::Phi { incoming } => {
                    self.unify_all(&mut state, incoming.iter().map(|(_, op)| *op))
                }
                Opcode::Select {
                    true_value,
                    false_value,
                } => self.unify_all(&mut state, [*true_value, *false_value]),
                Opcode::Opaque => {
                    state.insert(Resource::Unspecific);
                    Some(Resource::Unspecific)
                }
                Opcode::Call { callee, args } => {
                    let targets: Vec<Option<Resource>> =
                        args.iter().map(|a| self.target(&mut state, *a)).collect();
                    let summary = (self.lookup)(callee, args.len());
                    let site = CallSite {
                        caller: self.func,
                        call: i,
                        args: &targets,
                        globals: &self.globals,
                        incoming_depth: depth,
                    };
                    let r = summary.apply(&mut state, &site);
                    if self.module.returns_pointer(callee) {
                        r
                    } else {
                        None
                    }
                }
                Opcode::Ret { value } => value.and_then(|v| self.target(&mut state, v)),
                // No `_` pattern to ensure this is updated if the type changes
                Opcode::Br { .. } => None,
                Opcode::Unreachable => None,
                Opcode::Other => None,
            },
        };
        DataOut { val, state }
    }
}

/// Instruction results that point nowhere are bottom: a later pass, or a
/// later iteration over a recursive component, may still give them a target.
fn is_local(op: Operand) -> bool {
    matches!(op, Operand::Local(_))
}

/// Materialize `r` along with the chain of placeholders above it.
fn materialize(g: &mut PointsToGraph, r: Resource) {
    if let Resource::Incoming { root, depth } = r {
        let mut prev = match root {
            Root::Param(p) => Resource::param(p, 0),
            Root::Global(gl) => {
                let first = Resource::Incoming { root, depth: 0 };
                g.add_edge(Resource::global(gl), first);
                first
            }
        };
        g.insert(prev);
        for d in 1..=depth {
            let next = Resource::Incoming { root, depth: d };
            g.add_edge(prev, next);
            prev = next;
        }
    }
}

/// The state callers hand over: every global holds its incoming contents,
/// and caller memory the oracle puts in one object starts out unified.
fn entry_state(
    func: FuncId,
    f: &Function,
    module: &Module,
    oracle: &dyn AliasOracle,
    depth: u8,
) -> PointsToGraph {
    let mut g = PointsToGraph::new();
    for gl in module.global_ids() {
        let incoming = Resource::Incoming {
            root: Root::Global(gl),
            depth: 0,
        };
        g.add_edge(Resource::global(gl), incoming);
        if let Some(Operand::Global(h)) = module.globals[gl.index()].initializer {
            g.union(incoming, Resource::global(h));
        }
    }

    let mut by_object: BTreeMap<ObjectId, Vec<Resource>> = BTreeMap::new();
    let mut chain = |root: Root, mut obj: Option<ObjectId>| {
        for d in 0..depth {
            let Some(o) = obj else { break };
            by_object
                .entry(o)
                .or_default()
                .push(Resource::Incoming { root, depth: d });
            obj = oracle.contents(o);
        }
    };
    for p in f.pointer_params() {
        chain(Root::Param(p), oracle.param_target(func, p));
    }
    for gl in module.global_ids() {
        chain(Root::Global(gl), oracle.contents(oracle.global_object(gl)));
    }
    for gl in module.global_ids() {
        by_object
            .entry(oracle.global_object(gl))
            .or_default()
            .push(Resource::global(gl));
    }

    let unspecific = oracle.unspecific();
    for (o, rs) in by_object {
        // Distinct sites in one object are still distinct locations
        if !rs.iter().any(|r| matches!(r, Resource::Incoming { .. })) {
            continue;
        }
        if rs.len() == 1 && o != unspecific {
            continue;
        }
        for r in &rs {
            materialize(&mut g, *r);
        }
        for r in &rs[1..] {
            g.union(rs[0], *r);
        }
        if o == unspecific {
            g.union(rs[0], Resource::Unspecific);
        }
    }
    g
}

/// Check that the oracle still answers the way it did when the memory SSA
/// was built.
fn check_oracle(
    func: FuncId,
    f: &Function,
    cfg: &Cfg,
    oracle: &dyn AliasOracle,
    ssa: &MemorySsa,
) -> Result<(), Error> {
    for &b in cfg.rpo() {
        for &i in &f.block(b).instrs {
            if memssa::classify(func, f, i, oracle) != ssa.accesses[i.index()] {
                return Err(Error::OracleInconsistency {
                    function: f.name.clone(),
                    inst: f.instruction(i).name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Solve `func`, resolving calls through `lookup`.
pub fn solve(
    func: FuncId,
    module: &Module,
    oracle: &dyn AliasOracle,
    opts: &Options,
    lookup: &Lookup<'_>,
) -> Result<FunctionSolution, Error> {
    let f = module.function(func);
    let _span = tracing::debug_span!("solve", function = %f.name).entered();

    let cfg = Cfg::new(f);
    let ssa = MemorySsa::new(func, f, &cfg, oracle);
    if opts.check_oracle {
        check_oracle(func, f, &cfg, oracle, &ssa)?;
    }
    let dug = DefUseGraph::new(f, &cfg, &ssa);

    let entry = f.entry();
    let single_stack = if cfg.preds_of(entry).is_empty() {
        f.block(entry)
            .instrs
            .iter()
            .copied()
            .filter(|i| {
                matches!(
                    f.instruction(*i).opcode,
                    Opcode::Alloc {
                        kind: AllocKind::Stack
                    }
                )
            })
            .collect()
    } else {
        BTreeSet::new()
    };

    let mut solver = Solver {
        func,
        f,
        module,
        dug: &dug,
        opts,
        lookup,
        globals: module.global_ids().collect(),
        single_stack,
        kinds: ssa.merges.iter().map(|m| m.kind).collect(),
        entry: entry_state(func, f, module, oracle, opts.incoming_depth),
        outs: vec![DataOut::default(); dug.len()],
    };

    // Resources whose classes are tracked across passes
    let mut universe: Vec<Resource> = f.pointer_params().map(|p| Resource::param(p, 0)).collect();
    universe.extend(f.inst_ids().filter_map(|i| match f.instruction(i).opcode {
        Opcode::Alloc { .. } => Some(Resource::alloc(func, i)),
        _ => None,
    }));
    universe.extend(solver.globals.iter().map(|g| Resource::global(*g)));
    universe.push(Resource::Unspecific);
    let count = |g: &PointsToGraph| -> usize {
        universe
            .iter()
            .map(|r| g.find(*r))
            .collect::<BTreeSet<_>>()
            .len()
    };

    let mut merged = PointsToGraph::new();
    let mut class_history = Vec::new();
    let mut work: BTreeSet<usize> = (0..dug.len()).collect();
    let mut passes = 1;
    let mut last = None;
    while let Some(n) = work.pop_first() {
        if last.is_some_and(|l| n <= l) {
            class_history.push(count(&merged));
            passes += 1;
            if passes > opts.max_solver_iterations {
                return Err(Error::SolverDiverged {
                    function: f.name.clone(),
                    passes,
                });
            }
        }
        last = Some(n);

        let mut input = PointsToGraph::new();
        for p in dug.preds(n) {
            input.join(&solver.outs[*p].state);
        }
        let new = solver.transfer(dug.node(n), input);
        if solver.outs[n].join(&new) {
            merged.join(&solver.outs[n].state);
            work.extend(dug.succs(n).iter().copied());
        }
    }
    class_history.push(count(&merged));
    tracing::debug!("{} passes", passes);

    let mut exit = PointsToGraph::new();
    let mut ret: Option<Resource> = None;
    for &b in cfg.rpo() {
        let term = f.block(b).terminator();
        if let Opcode::Ret { .. } = f.instruction(term).opcode {
            if let Some(out) = dug.index_of(Node::Inst(term)).map(|k| &solver.outs[k]) {
                exit.join(&out.state);
                match (ret, out.val) {
                    (None, v) => ret = v,
                    (Some(r), Some(v)) => {
                        exit.union(r, v);
                    }
                    (Some(_), None) => (),
                }
            }
        }
    }
    if let Some(r) = ret {
        exit.insert(r);
    }
    let ret = ret.map(|r| exit.find(r));

    let outs = std::mem::take(&mut solver.outs);
    Ok(FunctionSolution {
        func,
        memssa: ssa,
        dug,
        outs,
        exit,
        merged,
        ret,
        passes,
        class_history,
    })
}
