// SPDX-License-Identifier: BSD-3-Clause
//! Def-use graph: the sparse dependence graph the solver iterates over.
//!
//! Nodes are reachable instructions, one phi per pointer parameter, and the
//! memory merges that survived congruence. Edges run from a definition to
//! each of its uses, for scalars (SSA values and parameters) and for memory
//! versions alike.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use super::memssa::{Def, MemorySsa, MergeId, MergeKind, Use};
use crate::ir::cfg::Cfg;
use crate::ir::{Function, InstId, Opcode, Operand};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Node {
    Inst(InstId),
    /// Incoming value of a pointer parameter
    ArgPhi(u32),
    ObjectPhi(MergeId),
}

#[derive(Clone, Debug, Default)]
pub struct DefUseGraph {
    /// Ordered for iteration: entry phis first, then blocks in reverse
    /// postorder
    nodes: Vec<Node>,
    index: FxHashMap<Node, usize>,
    preds: Vec<BTreeSet<usize>>,
    succs: Vec<BTreeSet<usize>>,
}

impl DefUseGraph {
    pub fn new(f: &Function, cfg: &Cfg, ssa: &MemorySsa) -> Self {
        let _span = tracing::trace_span!("dug", function = %f.name).entered();
        let mut g = DefUseGraph::default();

        for p in f.pointer_params() {
            g.add_node(Node::ArgPhi(p));
        }
        for m in ssa.entry_merges() {
            g.add_node(Node::ObjectPhi(*m));
        }
        for &b in cfg.rpo() {
            for m in ssa.joins_at(b) {
                g.add_node(Node::ObjectPhi(m));
            }
            for &i in &f.block(b).instrs {
                g.add_node(Node::Inst(i));
                for m in ssa.call_returns(i) {
                    g.add_node(Node::ObjectPhi(*m));
                }
            }
        }

        // Scalar edges
        for &b in cfg.rpo() {
            for &i in &f.block(b).instrs {
                for op in f.instruction(i).opcode.operands() {
                    let from = match op {
                        Operand::Local(j) => Node::Inst(j),
                        Operand::Param(p) => Node::ArgPhi(p),
                        Operand::Global(_) => continue,
                        Operand::Function(_) => continue,
                        Operand::Decl(_) => continue,
                        Operand::Null => continue,
                        Operand::Undef => continue,
                    };
                    g.add_edge(from, Node::Inst(i));
                }
            }
        }

        // Memory edges
        let uses: Vec<Use> = g
            .nodes
            .iter()
            .filter_map(|n| match n {
                Node::Inst(i) => Some(Use::Inst(*i)),
                Node::ObjectPhi(m) => Some(Use::Merge(*m)),
                Node::ArgPhi(_) => None,
            })
            .collect();
        for u in uses {
            let to = match u {
                Use::Inst(i) => Node::Inst(i),
                Use::Merge(m) => Node::ObjectPhi(m),
            };
            for (_, defs) in ssa.uses(u) {
                for d in defs {
                    let from = match d {
                        Def::Entry => continue,
                        Def::Inst(i) => Node::Inst(*i),
                        Def::Merge(m) => Node::ObjectPhi(*m),
                    };
                    g.add_edge(from, to);
                }
            }
        }
        // A parameter's incoming memory depends on the incoming pointer
        for m in ssa.entry_merges() {
            if let MergeKind::ArgIncoming { param } = ssa.merge(*m).kind {
                g.add_edge(Node::ArgPhi(param), Node::ObjectPhi(*m));
            }
        }
        // Calls define their call-return merges directly
        for &b in cfg.rpo() {
            for &i in &f.block(b).instrs {
                if let Opcode::Call { .. } = f.instruction(i).opcode {
                    for m in ssa.call_returns(i) {
                        g.add_edge(Node::Inst(i), Node::ObjectPhi(*m));
                    }
                }
            }
        }

        tracing::trace!("{} nodes", g.nodes.len());
        g
    }

    fn add_node(&mut self, n: Node) {
        if !self.index.contains_key(&n) {
            self.index.insert(n, self.nodes.len());
            self.nodes.push(n);
            self.preds.push(BTreeSet::new());
            self.succs.push(BTreeSet::new());
        }
    }

    /// Edges touching nodes that were never added (unreachable code, pruned
    /// merges) are dropped.
    fn add_edge(&mut self, from: Node, to: Node) {
        if let (Some(&a), Some(&b)) = (self.index.get(&from), self.index.get(&to)) {
            self.succs[a].insert(b);
            self.preds[b].insert(a);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, idx: usize) -> Node {
        self.nodes[idx]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn index_of(&self, n: Node) -> Option<usize> {
        self.index.get(&n).copied()
    }

    pub fn preds(&self, idx: usize) -> &BTreeSet<usize> {
        &self.preds[idx]
    }

    pub fn succs(&self, idx: usize) -> &BTreeSet<usize> {
        &self.succs[idx]
    }

    pub fn edge_count(&self) -> usize {
        self.succs.iter().map(BTreeSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FuncId, Module};
    use crate::oracle::UnificationOracle;
    use crate::signatures::Signatures;

    #[test]
    fn store_feeds_load() {
        let m = Module::from_json(
            r#"{"globals": [{"name": "a"}],
                "functions": [{"name": "f", "params": [{"name": "p"}], "blocks": [
                  {"name": "entry", "instructions": [
                    {"name": "s", "op": "alloca"},
                    {"op": "store", "pointer": "%s", "value": "%p"},
                    {"name": "x", "op": "load", "pointer": "%s"},
                    {"op": "ret"}]},
                  {"name": "dead", "instructions": [
                    {"name": "y", "op": "load", "pointer": "%s"},
                    {"op": "ret"}]}
                ]}]}"#,
        )
        .unwrap();
        let o = UnificationOracle::new(&m, &Signatures::default());
        let f = &m.functions[0];
        let cfg = Cfg::new(f);
        let ssa = MemorySsa::new(FuncId(0), f, &cfg, &o);
        let g = DefUseGraph::new(f, &cfg, &ssa);

        let arg = g.index_of(Node::ArgPhi(0)).unwrap();
        assert_eq!(arg, 0);
        let alloca = g.index_of(Node::Inst(InstId(0))).unwrap();
        let store = g.index_of(Node::Inst(InstId(1))).unwrap();
        let load = g.index_of(Node::Inst(InstId(2))).unwrap();
        assert!(g.succs(arg).contains(&store));
        assert!(g.succs(alloca).contains(&store));
        assert!(g.preds(load).contains(&store));
        assert!(g.preds(load).contains(&alloca));
        assert!(g.index_of(Node::Inst(InstId(4))).is_none());
        // Entry merges sit right after the parameter phis
        assert!(matches!(g.node(1), Node::ObjectPhi(_)));
        assert!(g.edge_count() >= 4);
    }
}
