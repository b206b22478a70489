// SPDX-License-Identifier: BSD-3-Clause
//! Interprocedural driver.
//!
//! Functions are solved one strongly connected component of the call graph
//! at a time, callees first, so every direct call outside the component can
//! use the callee's published summary. Within a recursive component, members
//! are solved repeatedly against each other's latest summaries until none
//! changes.
//!
//! Sources of unsoundness:
//!
//! - Signatures not expressive enough to model external functions (e.g.,
//!   functions that take a callback)
//! - Variable-arity functions
//! - An alias oracle that under-approximates
use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;
use tracing::{debug, debug_span, warn};
use triomphe::Arc;

use super::callgraph::CallGraph;
use super::solver::{self, FunctionSolution};
use super::summary::Summary;
use super::Error;
use crate::ir::{Callee, FuncId, FunctionName, Module, Opcode};
use crate::oracle::AliasOracle;
use crate::signatures::Signatures;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// How many dereferences below a parameter or global caller memory gets
    /// its own placeholder. Deeper memory is unspecific.
    pub incoming_depth: u8,
    /// Passes over a function's worklist before giving up on it
    pub max_solver_iterations: usize,
    /// Passes over a recursive component before giving up on it
    pub max_scc_iterations: usize,
    /// Re-query the oracle while solving and reject functions it answers
    /// differently for
    pub check_oracle: bool,
    pub strong_updates: bool,
    /// Keep each function's full solution in [`Outputs::solutions`]
    pub keep_solutions: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            incoming_depth: 2,
            max_solver_iterations: 64,
            max_scc_iterations: 16,
            check_oracle: true,
            strong_updates: true,
            keep_solutions: false,
        }
    }
}

/// Counts describing the run. Higher `conservative`, `oracle_inconsistencies`
/// and `diverged` mean less precise results.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metrics {
    pub functions: usize,
    pub sccs: usize,
    /// Components with recursion
    pub cyclic_sccs: usize,
    /// Passes over recursive components, summed
    pub scc_iterations: usize,
    /// Passes over function worklists, summed over every solve
    pub solver_passes: usize,
    /// Memory merges that survived congruence, summed over every solve
    pub merges: usize,
    pub dug_nodes: usize,
    /// Functions with conservative summaries
    pub conservative: usize,
    pub oracle_inconsistencies: usize,
    /// Solves that hit the worklist cap, plus recursive components that hit
    /// theirs
    pub diverged: usize,
}

#[derive(Debug)]
pub struct Outputs {
    pub summaries: BTreeMap<FuncId, Arc<Summary>>,
    /// Only with [`Options::keep_solutions`]
    pub solutions: BTreeMap<FuncId, FunctionSolution>,
    /// Called declarations with no signature, and calls to unknown names
    pub needs_signature: Vec<FunctionName>,
    pub conservative: Vec<FuncId>,
    pub metrics: Metrics,
}

struct Driver<'a> {
    module: &'a Module,
    oracle: &'a dyn AliasOracle,
    opts: &'a Options,
    /// Published summaries of defined functions
    cache: DashMap<FuncId, Arc<Summary>>,
    /// Indexed by [`crate::ir::DeclId`]
    decls: Vec<Option<Arc<Summary>>>,
    metrics: Metrics,
}

impl<'a> Driver<'a> {
    /// Resolve a callee, preferring `overlay` (a recursive component's
    /// in-flight summaries) over published ones.
    fn lookup(
        &self,
        overlay: &BTreeMap<FuncId, Arc<Summary>>,
        callee: &Callee,
        nargs: usize,
    ) -> Arc<Summary> {
        let found = match callee {
            Callee::Function(g) => overlay
                .get(g)
                .cloned()
                .or_else(|| self.cache.get(g).map(|s| s.value().clone())),
            Callee::Decl(d) => self.decls[d.index()].clone(),
            // No `_` pattern to ensure this is updated if the type changes
            Callee::Indirect(_) => None,
            Callee::Asm => None,
            Callee::Unknown(_) => None,
        };
        found.unwrap_or_else(|| Arc::new(Summary::conservative(nargs)))
    }

    fn conservative(&self, func: FuncId) -> Summary {
        Summary::conservative(self.module.function(func).params.len())
    }

    /// Solve one function and record how it went. Errors are logged and
    /// leave the function to a conservative summary.
    fn solve(
        &mut self,
        func: FuncId,
        overlay: &BTreeMap<FuncId, Arc<Summary>>,
    ) -> Option<FunctionSolution> {
        let lookup = |callee: &Callee, nargs: usize| self.lookup(overlay, callee, nargs);
        let result = solver::solve(func, self.module, self.oracle, self.opts, &lookup);
        match result {
            Ok(sol) => {
                self.metrics.solver_passes += sol.passes;
                self.metrics.merges += sol.memssa.live_merges().count();
                self.metrics.dug_nodes += sol.dug.len();
                Some(sol)
            }
            Err(e) => {
                match &e {
                    Error::OracleInconsistency { .. } => self.metrics.oracle_inconsistencies += 1,
                    Error::SolverDiverged { passes, .. } => {
                        self.metrics.solver_passes += passes;
                        self.metrics.diverged += 1;
                    }
                }
                warn!("{}; using a conservative summary", e);
                None
            }
        }
    }

    fn publish(&self, func: FuncId, summary: Summary) {
        self.cache.insert(func, Arc::new(summary));
    }
}

/// Points-to analysis of a whole module.
pub fn analysis(
    module: &Module,
    oracle: &dyn AliasOracle,
    signatures: &Signatures,
    opts: &Options,
) -> Outputs {
    let _span = debug_span!("pointer_analysis").entered();

    let mut needs_signature = BTreeSet::new();
    let decls: Vec<Option<Arc<Summary>>> = module
        .decls
        .iter()
        .map(|d| signatures.summary_for(module, d).map(Arc::new))
        .collect();
    for f in &module.functions {
        for inst in &f.instrs {
            match &inst.opcode {
                Opcode::Call {
                    callee: Callee::Decl(d),
                    ..
                } if decls[d.index()].is_none() => {
                    needs_signature.insert(module.decls[d.index()].name.clone());
                }
                Opcode::Call {
                    callee: Callee::Unknown(name),
                    ..
                } => {
                    needs_signature.insert(name.clone());
                }
                _ => (),
            }
        }
    }

    let mut driver = Driver {
        module,
        oracle,
        opts,
        cache: DashMap::with_capacity(module.functions.len()),
        decls,
        metrics: Metrics {
            functions: module.functions.len(),
            ..Metrics::default()
        },
    };
    let mut solutions = BTreeMap::new();
    let mut conservative = BTreeSet::new();

    let cg = CallGraph::new(module);
    let no_overlay = BTreeMap::new();
    for scc in cg.sccs() {
        driver.metrics.sccs += 1;
        let _span = debug_span!("scc", first = %module.function(scc[0]).name, size = scc.len())
            .entered();

        if !cg.is_cyclic(&scc) {
            let func = scc[0];
            match driver.solve(func, &no_overlay) {
                Some(sol) => {
                    driver.publish(func, Summary::project(&sol.exit, sol.ret));
                    if opts.keep_solutions {
                        solutions.insert(func, sol);
                    }
                }
                None => {
                    driver.publish(func, driver.conservative(func));
                    conservative.insert(func);
                }
            }
            continue;
        }

        driver.metrics.cyclic_sccs += 1;
        // Callers outside the component only ever see these or the fixpoint
        for f in &scc {
            driver.publish(*f, driver.conservative(*f));
        }
        let mut current: BTreeMap<FuncId, Arc<Summary>> = scc
            .iter()
            .map(|f| (*f, Arc::new(Summary::default())))
            .collect();
        let mut latest: BTreeMap<FuncId, FunctionSolution> = BTreeMap::new();
        let mut converged = false;
        for iteration in 1..=opts.max_scc_iterations {
            driver.metrics.scc_iterations += 1;
            let mut changed = false;
            for f in &scc {
                let new = match driver.solve(*f, &current) {
                    Some(sol) => {
                        let s = Summary::project(&sol.exit, sol.ret);
                        latest.insert(*f, sol);
                        s
                    }
                    None => driver.conservative(*f),
                };
                let old = &current[f];
                let joined = old.join(&new);
                if joined != **old {
                    changed = true;
                    current.insert(*f, Arc::new(joined));
                }
            }
            if !changed {
                debug!("converged after {} passes", iteration);
                converged = true;
                break;
            }
        }

        if converged {
            for (f, s) in current {
                if s.is_conservative() {
                    conservative.insert(f);
                }
                driver.cache.insert(f, s);
            }
            if opts.keep_solutions {
                solutions.extend(latest);
            }
        } else {
            warn!(
                "recursive component did not converge after {} passes; using conservative summaries",
                opts.max_scc_iterations
            );
            driver.metrics.diverged += 1;
            conservative.extend(scc.iter().copied());
        }
    }

    driver.metrics.conservative = conservative.len();
    debug!("{:?}", driver.metrics);
    Outputs {
        summaries: driver.cache.into_iter().collect(),
        solutions,
        needs_signature: needs_signature.into_iter().collect(),
        conservative: conservative.into_iter().collect(),
        metrics: driver.metrics,
    }
}
