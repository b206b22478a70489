// SPDX-License-Identifier: BSD-3-Clause
//! Arena-backed union-find.
//!
//! The leader of a class is always its least key. That makes leaders a pure
//! function of the partition: the same set of unions yields the same leaders
//! no matter the order they were performed in, and [`EqClass::find`] is
//! stable between unions. Key types arrange for absorbing elements (e.g. the
//! unspecific resource) to sort first so they win every union.

use std::cell::Cell;
use std::hash::Hash;

use rustc_hash::FxHashMap;

#[derive(Clone, Debug)]
pub struct EqClass<K> {
    index: FxHashMap<K, u32>,
    keys: Vec<K>,
    parent: Vec<Cell<u32>>,
    /// Class sizes, only meaningful at roots
    sizes: Vec<u32>,
    classes: usize,
}

impl<K> Default for EqClass<K> {
    fn default() -> Self {
        EqClass {
            index: FxHashMap::default(),
            keys: Vec::new(),
            parent: Vec::new(),
            sizes: Vec::new(),
            classes: 0,
        }
    }
}

impl<K: Copy + Ord + Hash> EqClass<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `k` was not yet tracked.
    pub fn insert(&mut self, k: K) -> bool {
        if self.index.contains_key(&k) {
            return false;
        }
        let slot = u32::try_from(self.keys.len()).expect("too many keys");
        self.index.insert(k, slot);
        self.keys.push(k);
        self.parent.push(Cell::new(slot));
        self.sizes.push(1);
        self.classes += 1;
        true
    }

    #[inline]
    pub fn contains(&self, k: &K) -> bool {
        self.index.contains_key(k)
    }

    fn root(&self, slot: u32) -> u32 {
        let mut root = slot;
        loop {
            let p = self.parent[root as usize].get();
            if p == root {
                break;
            }
            root = p;
        }
        // Path compression
        let mut current = slot;
        while current != root {
            let next = self.parent[current as usize].get();
            self.parent[current as usize].set(root);
            current = next;
        }
        root
    }

    /// Keys that were never inserted are their own singleton class.
    pub fn find(&self, k: K) -> K {
        match self.index.get(&k) {
            None => k,
            Some(&slot) => self.keys[self.root(slot) as usize],
        }
    }

    /// Merge the classes of `a` and `b`, returning the leader of the merged
    /// class and whether anything changed.
    pub fn union(&mut self, a: K, b: K) -> (K, bool) {
        self.insert(a);
        self.insert(b);
        let ra = self.root(self.index[&a]);
        let rb = self.root(self.index[&b]);
        if ra == rb {
            return (self.keys[ra as usize], false);
        }
        let (less, greater) = if self.keys[ra as usize] < self.keys[rb as usize] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[greater as usize].set(less);
        self.sizes[less as usize] += self.sizes[greater as usize];
        self.classes -= 1;
        (self.keys[less as usize], true)
    }

    #[inline]
    pub fn equivalent(&self, a: K, b: K) -> bool {
        self.find(a) == self.find(b)
    }

    /// Number of keys in the class of `k`; untracked keys are alone.
    pub fn class_size(&self, k: K) -> usize {
        match self.index.get(&k) {
            None => 1,
            Some(&slot) => self.sizes[self.root(slot) as usize] as usize,
        }
    }

    /// Number of distinct classes among the tracked keys.
    #[inline]
    pub fn classes(&self) -> usize {
        self.classes
    }

    /// Number of tracked keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.keys.iter().copied()
    }

    /// Every tracked key in the class of `k`, in insertion order.
    pub fn members(&self, k: K) -> Vec<K> {
        let leader = self.find(k);
        let mut ms: Vec<K> = self.keys().filter(|m| self.find(*m) == leader).collect();
        if ms.is_empty() {
            ms.push(k);
        }
        ms
    }

    /// Distinct leaders, sorted.
    pub fn leaders(&self) -> Vec<K> {
        let mut ls: Vec<K> = self
            .keys
            .iter()
            .enumerate()
            .filter(|(i, _)| self.parent[*i].get() as usize == *i)
            .map(|(_, k)| *k)
            .collect();
        ls.sort();
        ls
    }
}

#[cfg(test)]
mod tests {
    use super::EqClass;

    #[test]
    fn singletons() {
        let eq: EqClass<u32> = EqClass::new();
        assert_eq!(eq.find(7), 7);
        assert!(!eq.equivalent(1, 2));
        assert_eq!(eq.classes(), 0);
    }

    #[test]
    fn least_key_leads() {
        let mut eq = EqClass::new();
        eq.union(5, 9);
        eq.union(9, 3);
        assert_eq!(eq.find(5), 3);
        assert_eq!(eq.find(9), 3);
        assert_eq!(eq.find(3), 3);
        assert_eq!(eq.classes(), 1);
    }

    #[test]
    fn leaders_independent_of_order() {
        let mut a = EqClass::new();
        a.union(1, 2);
        a.union(3, 4);
        a.union(4, 2);
        let mut b = EqClass::new();
        b.union(4, 3);
        b.union(2, 4);
        b.union(2, 1);
        for k in 1..=4 {
            assert_eq!(a.find(k), b.find(k));
        }
    }

    #[test]
    fn find_is_stable_and_equivalence_symmetric() {
        let mut eq = EqClass::new();
        for (x, y) in [(10, 11), (12, 13), (11, 13), (20, 21)] {
            eq.union(x, y);
        }
        for k in [10, 11, 12, 13, 20, 21, 30] {
            let first = eq.find(k);
            assert_eq!(first, eq.find(k));
            for j in [10, 11, 12, 13, 20, 21, 30] {
                assert_eq!(eq.equivalent(k, j), eq.equivalent(j, k));
            }
        }
        assert_eq!(eq.classes(), 2);
    }

    #[test]
    fn union_reports_change() {
        let mut eq = EqClass::new();
        assert!(eq.union(1, 2).1);
        assert!(!eq.union(2, 1).1);
        assert_eq!(eq.members(2), vec![1, 2]);
        assert_eq!(eq.leaders(), vec![1]);
    }

    #[test]
    fn class_sizes_follow_unions() {
        let mut eq = EqClass::new();
        assert_eq!(eq.class_size(4), 1);
        eq.insert(4);
        assert_eq!(eq.class_size(4), 1);
        eq.union(4, 6);
        eq.union(7, 8);
        assert_eq!(eq.class_size(6), 2);
        eq.union(8, 4);
        for k in [4, 6, 7, 8] {
            assert_eq!(eq.class_size(k), eq.members(k).len());
        }
        assert!(!eq.union(6, 7).1);
        assert_eq!(eq.class_size(7), 4);
    }
}
