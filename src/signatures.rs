// SPDX-License-Identifier: BSD-3-Clause
//! Points-to behavior of declared functions, which have no body to analyze.
//!
//! Signatures are keyed by regular expressions over function names and read
//! from JSON, e.g.
//!
//! ```json
//! {
//!   "^malloc$": [{"return-alloc": {"type": "heap"}}],
//!   "^strcpy$": [{"arg-memcpy-arg": {"dst": 0, "src": 1}}, {"return-aliases-arg": {"arg": 0}}]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};

use regex::RegexSet;

use crate::analysis::graph::PointsToGraph;
use crate::analysis::resource::Resource;
use crate::analysis::summary::Summary;
use crate::ir::{Decl, Module};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocType {
    Heap,
    Stack,
    Top,
}

#[allow(clippy::enum_variant_names)]
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Signature {
    ReturnAlloc { r#type: AllocType },
    ReturnAliasesArg { arg: usize },
    ReturnPointsToGlobal { global: String },
    /// Copies the memory `src` points to into the memory `dst` points to
    ArgMemcpyArg { dst: usize, src: usize },
}

#[derive(Debug)]
pub struct Signatures {
    /// In the same order as the patterns of `set`
    sigs: Vec<Vec<Signature>>,
    set: RegexSet,
}

impl Default for Signatures {
    fn default() -> Self {
        Signatures {
            sigs: Vec::new(),
            set: RegexSet::empty(),
        }
    }
}

impl Signatures {
    pub fn new(sigs: HashMap<String, Vec<Signature>>) -> Result<Self, regex::Error> {
        // Sorted, so that matches come out in a stable order
        let sorted: BTreeMap<String, Vec<Signature>> = sigs.into_iter().collect();
        let set = RegexSet::new(sorted.keys())?;
        Ok(Signatures {
            sigs: sorted.into_values().collect(),
            set,
        })
    }

    pub fn len(&self) -> usize {
        self.sigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sigs.is_empty()
    }

    /// Every signature of every pattern matching `func`, or `None` if no
    /// pattern matches.
    pub fn signatures_for(&self, func: &str) -> Option<Vec<Signature>> {
        let mut matched = false;
        let mut sigs = Vec::new();
        for m in self.set.matches(func) {
            matched = true;
            sigs.extend(self.sigs[m].iter().cloned());
        }
        if matched {
            Some(sigs)
        } else {
            None
        }
    }

    /// The summary standing in for the body of `decl`, if it has signatures.
    pub fn summary_for(&self, module: &Module, decl: &Decl) -> Option<Summary> {
        let sigs = self.signatures_for(decl.name.get())?;
        let mut g = PointsToGraph::new();
        let mut ret: Option<Resource> = None;
        let arg = |a: usize| Resource::param(a as u32, 0);
        for sig in &sigs {
            let r = match sig {
                Signature::ReturnAlloc { r#type } => match r#type {
                    AllocType::Heap | AllocType::Stack => Some(Resource::Fresh),
                    AllocType::Top => Some(Resource::Unspecific),
                },
                Signature::ReturnAliasesArg { arg: a } => Some(arg(*a)),
                Signature::ReturnPointsToGlobal { global } => match module.find_global(global) {
                    Some(gl) => Some(Resource::global(gl)),
                    None => {
                        tracing::debug!("signature for {} names unknown global {}", decl.name, global);
                        Some(Resource::Unspecific)
                    }
                },
                Signature::ArgMemcpyArg { dst, src } => {
                    let contents = Resource::param(*dst as u32, 1);
                    g.add_edge(arg(*dst), contents);
                    g.add_edge(arg(*src), contents);
                    None
                }
            };
            if let Some(r) = r {
                g.insert(r);
                match ret {
                    None => ret = Some(r),
                    Some(prev) => {
                        g.union(prev, r);
                    }
                }
            }
        }
        Some(Summary::from_graph(&g, ret, false))
    }
}
