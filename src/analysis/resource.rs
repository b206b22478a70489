// SPDX-License-Identifier: BSD-3-Clause
//! Abstract locations tracked by the points-to state.

use std::fmt::Display;

use crate::ir::{FuncId, GlobalId, InstId, Module};

/// Where caller-owned memory was reached from.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Root {
    Param(u32),
    Global(GlobalId),
}

/// A statically known allocation.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Site {
    Alloc { func: FuncId, inst: InstId },
    Global(GlobalId),
}

/// The order of the variants matters: class leaders are least members, so
/// [`Resource::Unspecific`] leads (and absorbs) every class it is part of,
/// and [`Resource::Globals`] every class it is part of that is not
/// unspecific.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Resource {
    /// Any memory not modeled precisely
    Unspecific,
    /// Aggregate of all global variables
    Globals,
    /// Memory the function's callers own, found `depth` dereferences below
    /// a parameter's target or a global's content at entry
    Incoming { root: Root, depth: u8 },
    Site(Site),
    /// Memory a callee allocates and hands to its caller, only appears in
    /// summaries
    Fresh,
}

impl Resource {
    #[inline]
    pub fn global(g: GlobalId) -> Self {
        Resource::Site(Site::Global(g))
    }

    #[inline]
    pub fn alloc(func: FuncId, inst: InstId) -> Self {
        Resource::Site(Site::Alloc { func, inst })
    }

    #[inline]
    pub fn param(p: u32, depth: u8) -> Self {
        Resource::Incoming {
            root: Root::Param(p),
            depth,
        }
    }

    #[inline]
    pub fn is_unspecific(&self) -> bool {
        matches!(self, Resource::Unspecific)
    }

    /// Human-readable form, using the module's names.
    pub fn describe(&self, module: &Module) -> String {
        match self {
            Resource::Unspecific => "unspecific".to_string(),
            Resource::Globals => "globals".to_string(),
            Resource::Incoming { root, depth } => {
                let stars = "*".repeat(*depth as usize + 1);
                match root {
                    Root::Param(p) => format!("{}arg{}", stars, p),
                    Root::Global(g) => format!("{}{}", stars, module.globals[g.index()].name),
                }
            }
            Resource::Site(Site::Global(g)) => module.globals[g.index()].name.to_string(),
            Resource::Site(Site::Alloc { func, inst }) => {
                let f = module.function(*func);
                format!("{}:{}", f.name, f.instruction(*inst).name)
            }
            Resource::Fresh => "fresh".to_string(),
        }
    }
}

impl Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Unspecific => write!(f, "unspecific"),
            Resource::Globals => write!(f, "globals"),
            Resource::Incoming {
                root: Root::Param(p),
                depth,
            } => write!(f, "in(%arg{}, {})", p, depth),
            Resource::Incoming {
                root: Root::Global(g),
                depth,
            } => write!(f, "in({}, {})", g, depth),
            Resource::Site(Site::Alloc { func, inst }) => write!(f, "{}:{}", func, inst),
            Resource::Site(Site::Global(g)) => write!(f, "{}", g),
            Resource::Fresh => write!(f, "fresh"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecific_then_globals_sort_first() {
        let mut rs = vec![
            Resource::Fresh,
            Resource::global(GlobalId(0)),
            Resource::param(0, 0),
            Resource::Globals,
            Resource::Unspecific,
        ];
        rs.sort();
        assert_eq!(rs[0], Resource::Unspecific);
        assert_eq!(rs[1], Resource::Globals);
        assert_eq!(rs[2], Resource::param(0, 0));
    }
}
