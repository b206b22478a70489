// SPDX-License-Identifier: BSD-3-Clause
use std::io::{self, Write};

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use tracing_flame::FlameLayer;
use tracing_subscriber::{fmt, prelude::*};

use flowuni::{pointer, Module, Signatures, UnificationOracle};

mod cli;
mod layers;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

fn setup_global_subscriber() -> Result<impl Drop> {
    let filter_layer = tracing::level_filters::LevelFilter::TRACE;
    let fmt_layer = fmt::Layer::default().with_writer(io::stderr);
    let (flame_layer, guard) =
        FlameLayer::with_file("./tracing.folded").context("Couldn't create tracing.folded")?;
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(flame_layer)
        .with(layers::SpanTimeLayer)
        .init();
    Ok(guard)
}

fn main() -> Result<()> {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let args = cli::Args::parse();

    let _guard = if args.tracing {
        Some(setup_global_subscriber()?)
    } else {
        None
    };

    let signatures = if let Some(signatures_path) = &args.signatures {
        let signatures_string = std::fs::read_to_string(signatures_path)
            .context("Couldn't read points-to signatures")?;
        Signatures::new(
            serde_json::from_str(&signatures_string)
                .context("Couldn't deserialize points-to signatures")?,
        )
        .context("Couldn't construct points-to signatures")?
    } else {
        Signatures::default()
    };

    let module_string = std::fs::read_to_string(&args.module)
        .with_context(|| format!("Couldn't read module at {}", args.module.display()))?;
    let module = Module::from_json(&module_string)
        .with_context(|| format!("Couldn't load module at {}", args.module.display()))?;

    let oracle = UnificationOracle::new(&module, &signatures);
    let opts = pointer::Options {
        incoming_depth: args.incoming_depth,
        max_solver_iterations: args.max_solver_iterations,
        max_scc_iterations: args.max_scc_iterations,
        check_oracle: !args.no_check_oracle,
        strong_updates: !args.no_strong_updates,
        keep_solutions: false,
    };
    let outs = pointer::analysis(&module, &oracle, &signatures, &opts);

    if !args.quiet {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "summaries")?;
        writeln!(stdout, "---------")?;
        for (f, summary) in &outs.summaries {
            writeln!(stdout, "{}", module.function(*f).name)?;
            write!(stdout, "{}", summary.describe(&module))?;
            writeln!(stdout)?;
        }
        writeln!(stdout, "needs_signature")?;
        writeln!(stdout, "---------------")?;
        for f in &outs.needs_signature {
            writeln!(stdout, "{}", f)?;
        }
        writeln!(stdout)?;
        writeln!(stdout, "conservative")?;
        writeln!(stdout, "------------")?;
        for f in &outs.conservative {
            writeln!(stdout, "{}", module.function(*f).name)?;
        }
    }

    if args.metrics {
        let m = &outs.metrics;
        let mut stdout = io::stdout().lock();
        writeln!(stdout)?;
        writeln!(stdout, "metrics")?;
        writeln!(stdout, "-------")?;
        writeln!(stdout, "abstract objects: {}", oracle.len())?;
        writeln!(stdout, "functions: {}", m.functions)?;
        writeln!(stdout, "sccs: {} ({} recursive)", m.sccs, m.cyclic_sccs)?;
        writeln!(stdout, "scc iterations: {}", m.scc_iterations)?;
        writeln!(stdout, "solver passes: {}", m.solver_passes)?;
        writeln!(stdout, "memory merges: {}", m.merges)?;
        writeln!(stdout, "dug nodes: {}", m.dug_nodes)?;
        writeln!(stdout, "conservative summaries: {}", m.conservative)?;
        writeln!(stdout, "oracle inconsistencies: {}", m.oracle_inconsistencies)?;
        writeln!(stdout, "diverged: {}", m.diverged)?;
    }

    if args.strict && !outs.needs_signature.is_empty() {
        return Err(anyhow!("Found functions that need signatures!"));
    }

    Ok(())
}
