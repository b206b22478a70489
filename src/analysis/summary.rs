// SPDX-License-Identifier: BSD-3-Clause
//! Caller-facing digests of a function's points-to facts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use ascent::ascent_run;

use super::graph::PointsToGraph;
use super::resource::{Resource, Root, Site};
use crate::ir::{FuncId, GlobalId, InstId, Module};

/// Alias classes, class-to-class points-to edges and the return target of a
/// function, restricted to what its callers can observe.
///
/// Every lookup goes through [`Summary::find`], so stored leaders are never
/// consulted directly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Member to leader, fully compressed
    classes: BTreeMap<Resource, Resource>,
    /// Leader to leader
    points_to: BTreeMap<Resource, Resource>,
    ret: Option<Resource>,
    conservative: bool,
}

/// What a call site supplies to [`Summary::apply`].
#[derive(Debug)]
pub struct CallSite<'a> {
    pub caller: FuncId,
    pub call: InstId,
    /// Target of each argument, if it is a pointer
    pub args: &'a [Option<Resource>],
    pub globals: &'a [GlobalId],
    pub incoming_depth: u8,
}

impl Summary {
    /// Every argument's memory and every global may now hold anything, and the
    /// return value may point anywhere.
    pub fn conservative(params: usize) -> Self {
        let mut g = PointsToGraph::new();
        g.insert(Resource::Unspecific);
        for p in 0..params {
            g.add_edge(Resource::param(p as u32, 0), Resource::Unspecific);
        }
        g.add_edge(Resource::Globals, Resource::Unspecific);
        Self::from_graph(&g, Some(Resource::Unspecific), true)
    }

    /// Keep everything in the graph.
    pub fn from_graph(graph: &PointsToGraph, ret: Option<Resource>, conservative: bool) -> Self {
        let classes = graph.resources().map(|r| (r, graph.find(r))).collect();
        let points_to = graph.edges().into_iter().collect();
        Summary {
            classes,
            points_to,
            ret: ret.map(|r| graph.find(r)),
            conservative,
        }
    }

    /// Restrict a solved function's exit state to the classes reachable from
    /// its parameters, globals, its return target and unspecific.
    pub fn project(graph: &PointsToGraph, ret: Option<Resource>) -> Self {
        let _span = tracing::trace_span!("project").entered();
        let roots: Vec<Resource> = graph
            .resources()
            .filter(|r| match r {
                Resource::Unspecific => true,
                Resource::Globals => true,
                Resource::Incoming { .. } => true,
                Resource::Site(Site::Global(_)) => true,
                // No `_` pattern to ensure this is updated if the type changes
                Resource::Site(Site::Alloc { .. }) => false,
                Resource::Fresh => false,
            })
            .chain(ret)
            .map(|r| graph.find(r))
            .collect();
        let edges = graph.edges();

        #[allow(clippy::clone_on_copy)]
        let reach = ascent_run! {
            relation root(Resource);
            relation edge(Resource, Resource);
            relation reachable(Resource);

            root(*r) <-- for r in roots.iter();
            edge(*l, *p) <-- for (l, p) in edges.iter();

            reachable(r) <-- root(r);
            reachable(p) <-- reachable(l), edge(l, p);
        };
        let kept: BTreeSet<Resource> = reach.reachable.into_iter().map(|(r,)| r).collect();

        let classes = graph
            .resources()
            .filter_map(|r| {
                let leader = graph.find(r);
                kept.contains(&leader).then_some((r, leader))
            })
            .collect();
        let points_to = edges
            .into_iter()
            .filter(|(l, _)| kept.contains(l))
            .collect();
        Summary {
            classes,
            points_to,
            ret: ret.map(|r| graph.find(r)),
            conservative: false,
        }
    }

    pub fn to_graph(&self) -> PointsToGraph {
        let mut g = PointsToGraph::new();
        for (m, l) in &self.classes {
            g.union(*l, *m);
        }
        for (l, p) in &self.points_to {
            g.add_edge(*l, *p);
        }
        if let Some(r) = self.ret {
            g.insert(r);
        }
        g
    }

    /// Least upper bound of two summaries of the same function.
    pub fn join(&self, other: &Summary) -> Summary {
        let mut g = self.to_graph();
        g.join(&other.to_graph());
        let ret = match (self.ret, other.ret) {
            (Some(a), Some(b)) => {
                g.union(a, b);
                Some(a)
            }
            (a, b) => a.or(b),
        };
        Summary::from_graph(&g, ret, self.conservative || other.conservative)
    }

    #[inline]
    pub fn find(&self, r: Resource) -> Resource {
        self.classes.get(&r).copied().unwrap_or(r)
    }

    pub fn points_to(&self, r: Resource) -> Option<Resource> {
        self.points_to.get(&self.find(r)).map(|p| self.find(*p))
    }

    pub fn ret(&self) -> Option<Resource> {
        self.ret.map(|r| self.find(r))
    }

    pub fn is_conservative(&self) -> bool {
        self.conservative
    }

    pub fn contains(&self, r: Resource) -> bool {
        self.classes.contains_key(&r)
    }

    pub fn leaders(&self) -> BTreeSet<Resource> {
        self.classes.values().map(|l| self.find(*l)).collect()
    }

    pub fn members(&self, r: Resource) -> Vec<Resource> {
        let leader = self.find(r);
        self.classes
            .iter()
            .filter(|(_, l)| self.find(**l) == leader)
            .map(|(m, _)| *m)
            .collect()
    }

    pub fn edges(&self) -> impl Iterator<Item = (Resource, Resource)> + '_ {
        self.points_to
            .iter()
            .map(|(l, p)| (self.find(*l), self.find(*p)))
    }

    /// Resources the summary mentions.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The caller-side resources a callee resource stands for.
    fn map(&self, graph: &mut PointsToGraph, site: &CallSite<'_>, r: Resource) -> Vec<Resource> {
        let walk = |graph: &mut PointsToGraph, start: Option<Resource>, steps: u8| {
            let mut cur = start;
            for _ in 0..steps {
                cur = cur.and_then(|c| graph.deref(c, site.incoming_depth));
            }
            cur
        };
        match r {
            Resource::Unspecific => vec![Resource::Unspecific],
            // Only meaningful as the source of an edge
            Resource::Globals => Vec::new(),
            Resource::Incoming {
                root: Root::Param(p),
                depth,
            } => {
                let arg = site.args.get(p as usize).copied().flatten();
                walk(graph, arg, depth).into_iter().collect()
            }
            Resource::Incoming {
                root: Root::Global(g),
                depth,
            } => walk(graph, Some(Resource::global(g)), depth + 1)
                .into_iter()
                .collect(),
            Resource::Site(s) => vec![Resource::Site(s)],
            Resource::Fresh => vec![Resource::alloc(site.caller, site.call)],
        }
    }

    /// Substitute the summary into a caller's state at a call site. Returns
    /// the caller-side target of the call's result.
    pub fn apply(&self, graph: &mut PointsToGraph, site: &CallSite<'_>) -> Option<Resource> {
        let mut images: BTreeMap<Resource, Resource> = BTreeMap::new();
        for leader in self.leaders() {
            let mut image: Option<Resource> = None;
            for m in self.members(leader) {
                for r in self.map(graph, site, m) {
                    match image {
                        None => {
                            graph.insert(r);
                            image = Some(r);
                        }
                        Some(i) => {
                            graph.union(i, r);
                        }
                    }
                }
            }
            if let Some(i) = image {
                images.insert(leader, i);
            }
        }

        let edges: Vec<(Resource, Resource)> = self.edges().collect();
        for (l, p) in edges {
            let to = match images.get(&p) {
                Some(to) => *to,
                None => continue,
            };
            if let Some(from) = images.get(&l) {
                graph.add_edge(*from, to);
            }
            if self.find(Resource::Globals) == l {
                for g in site.globals {
                    graph.add_edge(Resource::global(*g), to);
                }
            }
        }

        self.ret().and_then(|r| images.get(&r).copied())
    }

    /// One line per class, for display.
    pub fn describe(&self, module: &Module) -> String {
        let mut s = String::new();
        let set = |rs: Vec<Resource>| {
            let names: Vec<String> = rs.iter().map(|r| r.describe(module)).collect();
            format!("{{{}}}", names.join(", "))
        };
        for leader in self.leaders() {
            let _ = write!(s, "{}", set(self.members(leader)));
            if let Some(p) = self.points_to(leader) {
                let _ = write!(s, " --> {}", set(self.members(p)));
            }
            s.push('\n');
        }
        if let Some(r) = self.ret() {
            let _ = writeln!(s, "ret --> {}", set(self.members(r)));
        }
        if self.conservative {
            s.push_str("(conservative)\n");
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(f: u32, i: u32) -> Resource {
        Resource::alloc(FuncId(f), InstId(i))
    }

    fn call_site<'a>(args: &'a [Option<Resource>], globals: &'a [GlobalId]) -> CallSite<'a> {
        CallSite {
            caller: FuncId(9),
            call: InstId(7),
            args,
            globals,
            incoming_depth: 2,
        }
    }

    #[test]
    fn projection_drops_locals() {
        let mut g = PointsToGraph::new();
        let p0 = Resource::param(0, 0);
        g.add_edge(p0, site(0, 1));
        g.add_edge(site(0, 2), site(0, 3));
        g.add_edge(site(0, 1), site(0, 4));
        let s = Summary::project(&g, None);
        assert!(s.contains(p0));
        assert!(s.contains(site(0, 1)));
        assert!(s.contains(site(0, 4)));
        assert!(!s.contains(site(0, 2)));
        assert!(!s.contains(site(0, 3)));
        assert!(!s.is_conservative());
    }

    #[test]
    fn projection_keeps_return_target() {
        let mut g = PointsToGraph::new();
        g.add_edge(site(0, 1), site(0, 2));
        let s = Summary::project(&g, Some(site(0, 1)));
        assert_eq!(s.ret(), Some(site(0, 1)));
        assert_eq!(s.points_to(site(0, 1)), Some(site(0, 2)));
    }

    #[test]
    fn apply_returning_argument() {
        let mut callee = PointsToGraph::new();
        callee.insert(Resource::param(0, 0));
        let s = Summary::project(&callee, Some(Resource::param(0, 0)));

        let mut caller = PointsToGraph::new();
        let arg = site(9, 0);
        caller.insert(arg);
        let args = [Some(arg)];
        let ret = s.apply(&mut caller, &call_site(&args, &[]));
        assert_eq!(ret.map(|r| caller.find(r)), Some(caller.find(arg)));
    }

    #[test]
    fn apply_store_through_parameter() {
        // callee: *p = q
        let mut callee = PointsToGraph::new();
        callee.add_edge(Resource::param(0, 0), Resource::param(1, 0));
        let s = Summary::project(&callee, None);

        let mut caller = PointsToGraph::new();
        let (a, b) = (site(9, 0), site(9, 1));
        caller.insert(a);
        caller.insert(b);
        let args = [Some(a), Some(b)];
        s.apply(&mut caller, &call_site(&args, &[]));
        assert_eq!(caller.pointee(a), Some(caller.find(b)));
    }

    #[test]
    fn apply_fresh_is_call_site() {
        let mut g = PointsToGraph::new();
        g.insert(Resource::Fresh);
        let s = Summary::from_graph(&g, Some(Resource::Fresh), false);
        let mut caller = PointsToGraph::new();
        let ret = s.apply(&mut caller, &call_site(&[], &[]));
        assert_eq!(ret, Some(site(9, 7)));
    }

    #[test]
    fn conservative_havocs_arguments_and_globals() {
        let s = Summary::conservative(1);
        assert!(s.is_conservative());
        let mut caller = PointsToGraph::new();
        let (a, b) = (site(9, 0), site(9, 1));
        caller.add_edge(a, b);
        let gl = GlobalId(0);
        caller.add_edge(Resource::global(gl), site(9, 2));
        let args = [Some(a)];
        let ret = s.apply(&mut caller, &call_site(&args, &[gl]));
        assert_eq!(ret, Some(Resource::Unspecific));
        assert_eq!(caller.find(b), Resource::Unspecific);
        assert_eq!(caller.find(site(9, 2)), Resource::Unspecific);
        // The argument itself is still precise
        assert_eq!(caller.find(a), a);
    }

    #[test]
    fn join_is_monotone() {
        let bottom = Summary::default();
        let mut g = PointsToGraph::new();
        g.add_edge(Resource::param(0, 0), site(0, 1));
        let s = Summary::project(&g, Some(site(0, 1)));
        let j = bottom.join(&s);
        assert_eq!(j, s.join(&bottom));
        assert_eq!(j.join(&s), j);
        assert_eq!(j.ret(), Some(site(0, 1)));
    }
}
