// SPDX-License-Identifier: BSD-3-Clause
//! Direct-call graph over the functions defined in a module.
//!
//! Calls to declarations, through pointers, to inline assembly or to unknown
//! names have no edge: the driver resolves them with signature or
//! conservative summaries, which never depend on the analysis order.

use std::collections::BTreeSet;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::ir::{Callee, FuncId, Module, Opcode};

#[derive(Debug)]
pub struct CallGraph {
    /// Caller to callee
    graph: DiGraph<FuncId, ()>,
    /// Indexed by [`FuncId`]
    nodes: Vec<NodeIndex>,
}

impl CallGraph {
    pub fn new(module: &Module) -> Self {
        let mut graph = DiGraph::with_capacity(module.functions.len(), 0);
        let nodes: Vec<NodeIndex> = module.function_ids().map(|f| graph.add_node(f)).collect();
        for caller in module.function_ids() {
            let f = module.function(caller);
            let mut callees = BTreeSet::new();
            for inst in &f.instrs {
                if let Opcode::Call {
                    callee: Callee::Function(g),
                    ..
                } = &inst.opcode
                {
                    callees.insert(*g);
                }
            }
            for g in callees {
                graph.add_edge(nodes[caller.index()], nodes[g.index()], ());
            }
        }
        CallGraph { graph, nodes }
    }

    pub fn callees(&self, f: FuncId) -> impl Iterator<Item = FuncId> + '_ {
        self.graph
            .neighbors(self.nodes[f.index()])
            .map(|n| self.graph[n])
    }

    /// Strongly connected components, callees before callers. Members are
    /// sorted.
    pub fn sccs(&self) -> Vec<Vec<FuncId>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .map(|scc| {
                let mut fs: Vec<FuncId> = scc.into_iter().map(|n| self.graph[n]).collect();
                fs.sort();
                fs
            })
            .collect()
    }

    /// Whether the component needs iterating: several members, or one that
    /// calls itself.
    pub fn is_cyclic(&self, scc: &[FuncId]) -> bool {
        match scc {
            [f] => self.callees(*f).any(|g| g == *f),
            _ => scc.len() > 1,
        }
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callees_come_first() {
        let m = Module::from_json(
            r#"{"functions": [
                {"name": "main", "blocks": [{"name": "entry", "instructions": [
                  {"op": "call", "callee": "@f"},
                  {"op": "call", "callee": "@leaf"},
                  {"op": "ret"}]}]},
                {"name": "f", "blocks": [{"name": "entry", "instructions": [
                  {"op": "call", "callee": "@g"},
                  {"op": "ret"}]}]},
                {"name": "g", "blocks": [{"name": "entry", "instructions": [
                  {"op": "call", "callee": "@f"},
                  {"op": "call", "callee": "@leaf"},
                  {"op": "ret"}]}]},
                {"name": "leaf", "blocks": [{"name": "entry", "instructions": [
                  {"op": "call", "callee": "@leaf"},
                  {"op": "call", "callee": "@printf"},
                  {"op": "ret"}]}]}
            ]}"#,
        )
        .unwrap();
        let cg = CallGraph::new(&m);
        let id = |n: &str| m.find_function(n).unwrap();
        let sccs = cg.sccs();
        assert_eq!(sccs.len(), 3);
        let pos = |f: FuncId| sccs.iter().position(|scc| scc.contains(&f)).unwrap();
        assert!(pos(id("leaf")) < pos(id("f")));
        assert!(pos(id("f")) < pos(id("main")));
        assert_eq!(sccs[pos(id("f"))], vec![id("f"), id("g")]);

        assert!(cg.is_cyclic(&[id("f"), id("g")]));
        assert!(cg.is_cyclic(&[id("leaf")]));
        assert!(!cg.is_cyclic(&[id("main")]));
        // The unknown callee gets no edge
        assert_eq!(cg.edge_count(), 6);
    }
}
