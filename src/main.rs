//! Command-line entrypoint: load a plan, run it, report results.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

use stagehand::config::load_plan;
use stagehand::notify::LogNotifier;
use stagehand::play::{Play, RunOptions};
use stagehand::{logging, report};

#[derive(Debug, Parser)]
#[command(name = "stagehand", version, about = "Run steps in parallel, stage by stage")]
struct Cli {
    /// Path to the YAML plan file.
    config: PathBuf,

    /// Prefix every output line with the command that produced it.
    #[arg(short, long)]
    verbose: bool,

    /// Directory to dump per-task logs into.
    #[arg(long, default_value = "/tmp/stagehand_log")]
    logs_dir: PathBuf,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,

    /// Print results as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let plan = load_plan(&cli.config)?;

    let mut play = Play::new(plan.play, plan.vars, Arc::new(LogNotifier));
    play.run(RunOptions {
        verbose: cli.verbose,
        color: !cli.no_color,
    })?;

    if let Err(error) = play.dump_logs(&cli.logs_dir) {
        warn!(error = %format!("{error:#}"), "failed to dump logs");
    }

    let results = play.results(&cli.logs_dir);
    if cli.json {
        println!("{}", report::render_json(&results)?);
    } else {
        print!("{}", report::render_table(&results));
    }
    Ok(())
}
