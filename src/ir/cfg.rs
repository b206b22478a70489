// SPDX-License-Identifier: BSD-3-Clause
//! Control-flow queries over a [`Function`].
//!
//! Dominators follow Keith D. Cooper, Timothy J. Harvey, and Ken Kennedy: A
//! Simple, Fast Dominance Algorithm. Blocks unreachable from the entry have
//! no dominator and no frontier.

use std::collections::BTreeSet;

use super::{BlockId, Function};

#[derive(Debug, Clone)]
pub struct Cfg {
    succs: Vec<Vec<BlockId>>,
    preds: Vec<Vec<BlockId>>,
    rpo: Vec<BlockId>,
    rpo_nums: Vec<Option<u32>>,
    doms: Vec<Option<BlockId>>,
}

impl Cfg {
    pub fn new(f: &Function) -> Self {
        let n = f.blocks.len();
        let mut succs = vec![Vec::new(); n];
        let mut preds = vec![Vec::new(); n];
        for b in f.block_ids() {
            let term = f.instruction(f.block(b).terminator());
            for &s in term.opcode.successors() {
                if !succs[b.index()].contains(&s) {
                    succs[b.index()].push(s);
                    preds[s.index()].push(b);
                }
            }
        }
        let mut cfg = Cfg {
            succs,
            preds,
            rpo: Vec::new(),
            rpo_nums: vec![None; n],
            doms: vec![None; n],
        };
        cfg.compute_rpo(f.entry());
        cfg.compute_doms();
        cfg
    }

    fn compute_rpo(&mut self, entry: BlockId) {
        let n = self.succs.len();
        let mut visited = vec![false; n];
        let mut post = Vec::with_capacity(n);
        // Iterative DFS: (block, next successor index)
        let mut stack = vec![(entry, 0usize)];
        visited[entry.index()] = true;
        while let Some((b, i)) = stack.pop() {
            if let Some(&s) = self.succs[b.index()].get(i) {
                stack.push((b, i + 1));
                if !visited[s.index()] {
                    visited[s.index()] = true;
                    stack.push((s, 0));
                }
            } else {
                post.push(b);
            }
        }
        post.reverse();
        for (i, b) in post.iter().enumerate() {
            self.rpo_nums[b.index()] = Some(i as u32);
        }
        self.rpo = post;
    }

    fn compute_doms(&mut self) {
        let entry = match self.rpo.first() {
            Some(&e) => e,
            None => return,
        };
        self.doms[entry.index()] = Some(entry);
        let mut changed = true;
        while changed {
            changed = false;
            for &block in self.rpo.iter().skip(1) {
                let mut new_dom = None;
                for &pred in &self.preds[block.index()] {
                    if self.doms[pred.index()].is_none() {
                        continue;
                    }
                    new_dom = Some(match new_dom {
                        None => pred,
                        Some(d) => self.intersect(d, pred),
                    });
                }
                if new_dom.is_some() && new_dom != self.doms[block.index()] {
                    self.doms[block.index()] = new_dom;
                    changed = true;
                }
            }
        }
    }

    fn intersect(&self, mut b1: BlockId, mut b2: BlockId) -> BlockId {
        let num = |b: BlockId| self.rpo_nums[b.index()].unwrap_or(u32::MAX);
        while b1 != b2 {
            while num(b1) > num(b2) {
                b1 = self.doms[b1.index()].unwrap_or(b2);
            }
            while num(b2) > num(b1) {
                b2 = self.doms[b2.index()].unwrap_or(b1);
            }
        }
        b1
    }

    pub fn succs_of(&self, b: BlockId) -> &[BlockId] {
        &self.succs[b.index()]
    }

    pub fn preds_of(&self, b: BlockId) -> &[BlockId] {
        &self.preds[b.index()]
    }

    /// Reachable blocks in reverse postorder.
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    pub fn is_reachable(&self, b: BlockId) -> bool {
        self.rpo_nums[b.index()].is_some()
    }

    /// `None` for the entry and for unreachable blocks.
    pub fn idom_of(&self, b: BlockId) -> Option<BlockId> {
        if self.rpo.first() == Some(&b) {
            return None;
        }
        self.doms[b.index()]
    }

    /// Dominator tree children, in reverse postorder.
    pub fn dom_children(&self) -> Vec<Vec<BlockId>> {
        let mut children = vec![Vec::new(); self.succs.len()];
        for &b in &self.rpo {
            if let Some(d) = self.idom_of(b) {
                children[d.index()].push(b);
            }
        }
        children
    }

    /// Dominance frontier of every block.
    pub fn frontiers(&self) -> Vec<BTreeSet<BlockId>> {
        let mut df = vec![BTreeSet::new(); self.succs.len()];
        for &block in &self.rpo {
            let preds: Vec<BlockId> = self.preds[block.index()]
                .iter()
                .copied()
                .filter(|p| self.is_reachable(*p))
                .collect();
            // The entry also joins the edge from the function's start, and
            // its frontier walk runs up to and including itself
            let is_entry = self.rpo.first() == Some(&block);
            if preds.len() + usize::from(is_entry) < 2 {
                continue;
            }
            let idom = if is_entry {
                None
            } else {
                self.doms[block.index()]
            };
            for pred in preds {
                let mut runner = pred;
                while Some(runner) != idom {
                    df[runner.index()].insert(block);
                    match self.idom_of(runner) {
                        Some(d) => runner = d,
                        None => break,
                    }
                }
            }
        }
        df
    }

    /// Iterated dominance frontier of a set of blocks.
    pub fn iterated_frontier(
        &self,
        df: &[BTreeSet<BlockId>],
        defs: impl IntoIterator<Item = BlockId>,
    ) -> BTreeSet<BlockId> {
        let mut result = BTreeSet::new();
        let mut work: Vec<BlockId> = defs.into_iter().collect();
        while let Some(b) = work.pop() {
            for &f in &df[b.index()] {
                if result.insert(f) {
                    work.push(f);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::Cfg;
    use crate::ir::{BlockId, Module};

    fn diamond() -> Module {
        Module::from_json(
            r#"{"functions": [{"name": "f", "blocks": [
              {"name": "entry", "instructions": [{"op": "br", "targets": ["then", "else"]}]},
              {"name": "then", "instructions": [{"op": "br", "targets": ["merge"]}]},
              {"name": "else", "instructions": [{"op": "br", "targets": ["merge"]}]},
              {"name": "merge", "instructions": [{"op": "ret"}]},
              {"name": "dead", "instructions": [{"op": "br", "targets": ["merge"]}]}
            ]}]}"#,
        )
        .unwrap()
    }

    #[test]
    fn dom_tree_if_else() {
        let m = diamond();
        let cfg = Cfg::new(&m.functions[0]);
        let (entry, then, els, merge, dead) =
            (BlockId(0), BlockId(1), BlockId(2), BlockId(3), BlockId(4));
        assert_eq!(cfg.idom_of(entry), None);
        assert_eq!(cfg.idom_of(then), Some(entry));
        assert_eq!(cfg.idom_of(els), Some(entry));
        assert_eq!(cfg.idom_of(merge), Some(entry));
        assert!(!cfg.is_reachable(dead));

        let df = cfg.frontiers();
        assert_eq!(df[then.index()].iter().copied().collect::<Vec<_>>(), vec![merge]);
        assert_eq!(df[els.index()].iter().copied().collect::<Vec<_>>(), vec![merge]);
        assert!(df[entry.index()].is_empty());
        assert!(df[dead.index()].is_empty());
    }

    #[test]
    fn loop_header_in_own_frontier() {
        let m = Module::from_json(
            r#"{"functions": [{"name": "f", "blocks": [
              {"name": "entry", "instructions": [{"op": "br", "targets": ["head"]}]},
              {"name": "head", "instructions": [{"op": "br", "targets": ["body", "exit"]}]},
              {"name": "body", "instructions": [{"op": "br", "targets": ["head"]}]},
              {"name": "exit", "instructions": [{"op": "ret"}]}
            ]}]}"#,
        )
        .unwrap();
        let cfg = Cfg::new(&m.functions[0]);
        let df = cfg.frontiers();
        let idf = cfg.iterated_frontier(&df, [BlockId(2)]);
        assert_eq!(idf.into_iter().collect::<Vec<_>>(), vec![BlockId(1)]);
        assert_eq!(cfg.rpo()[0], BlockId(0));
        assert_eq!(cfg.rpo().len(), 4);
    }

    #[test]
    fn entry_loop_joins_at_entry() {
        let m = Module::from_json(
            r#"{"functions": [{"name": "f", "blocks": [
              {"name": "entry", "instructions": [{"op": "br", "targets": ["entry", "exit"]}]},
              {"name": "exit", "instructions": [{"op": "ret"}]}
            ]}]}"#,
        )
        .unwrap();
        let cfg = Cfg::new(&m.functions[0]);
        let df = cfg.frontiers();
        assert_eq!(df[0].iter().copied().collect::<Vec<_>>(), vec![BlockId(0)]);
        assert!(df[1].is_empty());
        assert_eq!(cfg.idom_of(BlockId(1)), Some(BlockId(0)));
    }
}
