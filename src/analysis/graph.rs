// SPDX-License-Identifier: BSD-3-Clause
//! Unification-based points-to state.
//!
//! Resources are partitioned into alias classes, and each class points to at
//! most one other class. Giving a class a second pointee merges the two
//! pointees instead, so the graph stays a function from classes to classes.

use std::collections::BTreeMap;

use super::resource::{Resource, Root, Site};
use crate::union::EqClass;

#[derive(Clone, Debug, Default)]
pub struct PointsToGraph {
    classes: EqClass<Resource>,
    /// Class leader to some member of the pointee class. Always keyed by the
    /// current leader.
    pointees: BTreeMap<Resource, Resource>,
}

impl PointsToGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `r` was not yet tracked.
    pub fn insert(&mut self, r: Resource) -> bool {
        let added = self.classes.insert(r);
        if added && r.is_unspecific() {
            let leader = self.classes.find(r);
            self.pointees.insert(leader, Resource::Unspecific);
        }
        added
    }

    #[inline]
    pub fn contains(&self, r: Resource) -> bool {
        self.classes.contains(&r)
    }

    #[inline]
    pub fn find(&self, r: Resource) -> Resource {
        self.classes.find(r)
    }

    #[inline]
    pub fn equivalent(&self, a: Resource, b: Resource) -> bool {
        self.classes.equivalent(a, b)
    }

    /// Number of alias classes.
    #[inline]
    pub fn classes(&self) -> usize {
        self.classes.classes()
    }

    pub fn resources(&self) -> impl Iterator<Item = Resource> + '_ {
        self.classes.keys()
    }

    pub fn leaders(&self) -> Vec<Resource> {
        self.classes.leaders()
    }

    pub fn members(&self, r: Resource) -> Vec<Resource> {
        self.classes.members(r)
    }

    #[inline]
    pub fn is_singleton(&self, r: Resource) -> bool {
        self.classes.class_size(r) == 1
    }

    /// Leader of the class `r`'s class points to.
    pub fn pointee(&self, r: Resource) -> Option<Resource> {
        self.pointees
            .get(&self.classes.find(r))
            .map(|p| self.classes.find(*p))
    }

    /// `(class leader, pointee leader)` for every class with a pointee.
    pub fn edges(&self) -> Vec<(Resource, Resource)> {
        self.pointees
            .iter()
            .map(|(l, p)| (*l, self.classes.find(*p)))
            .collect()
    }

    /// Merge the classes of `a` and `b`, and then their pointees.
    pub fn union(&mut self, a: Resource, b: Resource) -> bool {
        let mut changed = self.insert(a);
        changed |= self.insert(b);
        let mut work = vec![(a, b)];
        while let Some((a, b)) = work.pop() {
            let (ra, rb) = (self.classes.find(a), self.classes.find(b));
            if ra == rb {
                continue;
            }
            changed = true;
            let pa = self.pointees.remove(&ra);
            let pb = self.pointees.remove(&rb);
            let (leader, _) = self.classes.union(ra, rb);
            match (pa, pb) {
                (Some(x), Some(y)) => {
                    self.pointees.insert(leader, x);
                    work.push((x, y));
                }
                (Some(x), None) | (None, Some(x)) => {
                    self.pointees.insert(leader, x);
                }
                (None, None) => (),
            }
        }
        changed
    }

    /// Weak update: `from`'s class may now also point to `to`.
    pub fn add_edge(&mut self, from: Resource, to: Resource) -> bool {
        let mut changed = self.insert(from);
        changed |= self.insert(to);
        let leader = self.classes.find(from);
        match self.pointees.get(&leader) {
            Some(p) => {
                let p = *p;
                changed | self.union(p, to)
            }
            None => {
                self.pointees.insert(leader, to);
                true
            }
        }
    }

    /// Strong update: `from`'s class now points only to `to`. The caller is
    /// responsible for `from` denoting a single run-time location.
    pub fn strong_update(&mut self, from: Resource, to: Resource) -> bool {
        let mut changed = self.insert(from);
        changed |= self.insert(to);
        let leader = self.classes.find(from);
        debug_assert!(!leader.is_unspecific());
        let old = self.pointees.insert(leader, to);
        changed || old.map(|o| self.classes.find(o)) != Some(self.classes.find(to))
    }

    /// The pointee of `r`'s class, materializing a placeholder for caller-owned
    /// memory that has not been read yet. Placeholders nest `depth` levels;
    /// below that, caller memory is unspecific. Returns `None` for memory this
    /// function owns and never initialized.
    pub fn deref(&mut self, r: Resource, depth: u8) -> Option<Resource> {
        if let Some(p) = self.pointee(r) {
            return Some(p);
        }
        let placeholder = self
            .members(r)
            .into_iter()
            .filter_map(|m| match m {
                Resource::Unspecific => Some(Resource::Unspecific),
                Resource::Incoming { root, depth: d } => {
                    if d.saturating_add(1) < depth {
                        Some(Resource::Incoming { root, depth: d + 1 })
                    } else {
                        Some(Resource::Unspecific)
                    }
                }
                Resource::Site(Site::Global(g)) => Some(Resource::Incoming {
                    root: Root::Global(g),
                    depth: 0,
                }),
                // No `_` pattern to ensure this is updated if the type changes
                Resource::Globals => None,
                Resource::Site(Site::Alloc { .. }) => None,
                Resource::Fresh => None,
            })
            .min()?;
        self.add_edge(r, placeholder);
        self.pointee(r)
    }

    /// Least upper bound: afterwards, every class of `other` is contained in
    /// a class of `self` and every edge of `other` is present in `self`.
    pub fn join(&mut self, other: &PointsToGraph) -> bool {
        let mut changed = false;
        for r in other.classes.keys() {
            changed |= self.insert(r);
            let leader = other.classes.find(r);
            if leader != r {
                changed |= self.union(leader, r);
            }
        }
        for (l, p) in &other.pointees {
            changed |= self.add_edge(*l, *p);
        }
        changed
    }
}

/// Per-node solver fact: what the node's value points to, and the points-to
/// state after the node.
#[derive(Clone, Debug, Default)]
pub struct DataOut {
    pub val: Option<Resource>,
    pub state: PointsToGraph,
}

impl DataOut {
    pub fn join(&mut self, other: &DataOut) -> bool {
        let mut changed = self.state.join(&other.state);
        match (self.val, other.val) {
            (None, Some(v)) => {
                self.state.insert(v);
                self.val = Some(v);
                changed = true;
            }
            (Some(a), Some(b)) => changed |= self.state.union(a, b),
            (Some(_), None) => (),
            (None, None) => (),
        }
        changed
    }

    /// Leader of the class the value points to.
    pub fn target(&self) -> Option<Resource> {
        self.val.map(|v| self.state.find(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FuncId, GlobalId, InstId};

    fn site(i: u32) -> Resource {
        Resource::alloc(FuncId(0), InstId(i))
    }

    #[test]
    fn second_pointee_unifies() {
        let mut g = PointsToGraph::new();
        assert!(g.add_edge(site(0), site(1)));
        assert!(g.add_edge(site(0), site(2)));
        assert!(g.equivalent(site(1), site(2)));
        assert_eq!(g.pointee(site(0)), Some(site(1)));
        assert!(!g.add_edge(site(0), site(2)));
    }

    #[test]
    fn union_unifies_pointees() {
        let mut g = PointsToGraph::new();
        g.add_edge(site(0), site(10));
        g.add_edge(site(1), site(11));
        g.add_edge(site(10), site(20));
        g.add_edge(site(11), site(21));
        g.union(site(0), site(1));
        assert!(g.equivalent(site(10), site(11)));
        assert!(g.equivalent(site(20), site(21)));
    }

    #[test]
    fn unspecific_absorbs() {
        let mut g = PointsToGraph::new();
        g.add_edge(site(0), site(1));
        g.add_edge(site(1), site(2));
        g.union(site(0), Resource::Unspecific);
        assert_eq!(g.find(site(0)), Resource::Unspecific);
        // Everything reachable from unspecific is unspecific
        assert_eq!(g.find(site(1)), Resource::Unspecific);
        assert_eq!(g.find(site(2)), Resource::Unspecific);
        assert_eq!(g.pointee(Resource::Unspecific), Some(Resource::Unspecific));
        g.union(site(3), site(4));
        assert_eq!(g.find(site(0)), Resource::Unspecific);
        assert!(g.equivalent(site(0), site(2)));
    }

    #[test]
    fn strong_update_replaces() {
        let mut g = PointsToGraph::new();
        g.add_edge(site(0), site(1));
        assert!(g.strong_update(site(0), site(2)));
        assert_eq!(g.pointee(site(0)), Some(site(2)));
        assert!(!g.equivalent(site(1), site(2)));
        assert!(!g.strong_update(site(0), site(2)));
    }

    #[test]
    fn deref_materializes_incoming() {
        let mut g = PointsToGraph::new();
        let p = Resource::param(0, 0);
        g.insert(p);
        assert_eq!(g.deref(p, 2), Some(Resource::param(0, 1)));
        assert_eq!(g.deref(Resource::param(0, 1), 2), Some(Resource::Unspecific));
        assert_eq!(g.deref(site(5), 2), None);
        let gl = Resource::global(GlobalId(3));
        assert_eq!(
            g.deref(gl, 2),
            Some(Resource::Incoming {
                root: Root::Global(GlobalId(3)),
                depth: 0
            })
        );
    }

    #[test]
    fn join_is_upper_bound() {
        let mut a = PointsToGraph::new();
        a.add_edge(site(0), site(1));
        let mut b = PointsToGraph::new();
        b.add_edge(site(0), site(2));
        b.union(site(3), site(4));
        assert!(a.join(&b));
        assert!(a.equivalent(site(1), site(2)));
        assert!(a.equivalent(site(3), site(4)));
        assert!(!a.join(&b));
        let classes = a.classes();
        a.join(&b);
        assert_eq!(classes, a.classes());
    }
}
