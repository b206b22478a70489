// SPDX-License-Identifier: BSD-3-Clause
//! The points-to analysis proper: memory SSA, the def-use graph built on it,
//! the per-function solver and the interprocedural driver.

use crate::ir::{FunctionName, InstructionName};

pub mod callgraph;
pub mod dug;
pub mod graph;
pub mod memssa;
pub mod pointer;
pub mod resource;
pub mod solver;
pub mod summary;

/// Failure to analyze a single function. The driver recovers from both by
/// falling back to a conservative summary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Alias oracle gave different answers for {function}:{inst}")]
    OracleInconsistency {
        function: FunctionName,
        inst: InstructionName,
    },
    #[error("Solver did not stabilize on {function} after {passes} passes")]
    SolverDiverged {
        function: FunctionName,
        passes: usize,
    },
}
