// SPDX-License-Identifier: BSD-3-Clause
use std::path::PathBuf;

/// Flow-sensitive points-to analysis for programs in JSON form
#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Program to analyze
    #[arg()]
    pub module: PathBuf,

    /// Points-to signatures for declared functions
    #[arg(short, long)]
    pub signatures: Option<PathBuf>,

    /// Quiet
    #[arg(long)]
    pub quiet: bool,

    /// Tracing
    #[arg(long)]
    pub tracing: bool,

    /// Report metrics about the run
    #[arg(long)]
    pub metrics: bool,

    /// Dereferences below a parameter or global that get their own
    /// placeholder
    #[arg(long, default_value_t = 2)]
    pub incoming_depth: u8,

    /// Worklist passes per function before it gets a conservative summary
    #[arg(long, default_value_t = 64)]
    pub max_solver_iterations: usize,

    /// Passes over a recursive component before its members get
    /// conservative summaries
    #[arg(long, default_value_t = 16)]
    pub max_scc_iterations: usize,

    /// Don't re-query the alias oracle while solving
    #[arg(long)]
    pub no_check_oracle: bool,

    /// Only ever add points-to edges
    #[arg(long)]
    pub no_strong_updates: bool,

    /// Fail if a called function has no body and no signature
    #[arg(long)]
    pub strict: bool,
}
