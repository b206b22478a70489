// SPDX-License-Identifier: BSD-3-Clause
//! Flow-sensitive, unification-based points-to analysis over memory SSA.

pub mod analysis;
pub mod ir;
pub mod oracle;
pub mod signatures;
pub mod union;

pub use analysis::pointer;
pub use analysis::resource::{Resource, Root, Site};
pub use analysis::summary::Summary;
pub use ir::{FuncId, InstId, Module, Operand};
pub use oracle::{AliasOracle, UnificationOracle};
pub use signatures::Signatures;

/// Failure to load a program.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed module: {0}")]
    Module(#[from] ir::Error),
    #[error("Couldn't deserialize module: {0}")]
    Json(#[from] serde_json::Error),
}
