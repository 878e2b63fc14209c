use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use polars::prelude::*;
use tracing_subscriber::fmt::SubscriberBuilder;

use beamcut::prelude::*;

mod provenance;
mod traj;

use traj::TrajStation;

#[derive(Parser)]
#[command(name = "beamcut-cli")]
#[command(about = "Beam-guided plane-cut decomposition runner")]
struct Cmd {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Search a part and persist trajectory tables under the output dir
    Run {
        /// Part file the search is keyed on (synthetic backend)
        #[arg(long)]
        part: PathBuf,
        /// Beam width W
        #[arg(long, default_value_t = 4)]
        width: usize,
        #[arg(long, default_value = "data")]
        out: PathBuf,
        /// Retain cut-away geometry and export the best segmentation
        #[arg(long)]
        export: bool,
        /// Synthetic backend seed
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Peek at a persisted node table
    Inspect {
        /// Output stem written by `run`, e.g. data/widget
        #[arg(long)]
        stem: PathBuf,
    },
    /// Print a small provenance JSON block
    Report,
}

fn main() -> Result<()> {
    SubscriberBuilder::default().with_target(false).init();
    let cmd = Cmd::parse();
    match cmd.action {
        Action::Run {
            part,
            width,
            out,
            export,
            seed,
        } => run(part, width, out, export, seed),
        Action::Inspect { stem } => inspect(stem),
        Action::Report => report(),
    }
}

fn run(part: PathBuf, width: usize, out: PathBuf, export: bool, seed: u64) -> Result<()> {
    tracing::info!(part = %part.display(), width, out = %out.display(), export, seed, "run");
    let engine = SyntheticEngine::new(SyntheticCfg {
        seed,
        ..SyntheticCfg::default()
    });
    let mut opts = SearchOpts::new(width);
    opts.output_dir = out;
    opts.export = export;
    let mut search = BeamSearch::new(engine, TrajStation::new(), &part, None, opts)?;
    let outcome = search.start_search()?;
    tracing::info!(
        rounds = outcome.rounds,
        best = outcome.best_reward,
        beam = outcome.beam_len,
        "search finished"
    );

    provenance::write_sidecar(
        outcome.stem.with_extension("nodes.csv"),
        serde_json::json!({
            "part": part.to_string_lossy(),
            "width": width,
            "export": export,
            "seed": seed,
            "rounds": outcome.rounds,
            "best_reward": outcome.best_reward,
        }),
    )?;
    Ok(())
}

fn inspect(stem: PathBuf) -> Result<()> {
    let nodes = stem.with_extension("nodes.csv");
    let lf = LazyCsvReader::new(nodes.to_string_lossy().as_ref())
        .with_infer_schema_length(Some(100))
        .finish()?;
    let df = lf.limit(5).collect()?; // keep it light and fast
    tracing::info!(rows = df.height(), cols = df.width(), "node_table_head_shape");
    println!("{df}");
    Ok(())
}

fn report() -> Result<()> {
    let obj = serde_json::json!({
        "code_rev": provenance::current_git_rev(),
        "search_kind": beamcut::search::SEARCH_KIND,
        "version": beamcut::VERSION,
    });
    println!("{}", serde_json::to_string_pretty(&obj)?);
    Ok(())
}
