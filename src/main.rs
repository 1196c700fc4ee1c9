//! seqdesign CLI - interactive sequential experiment design
//!
//! Loads the experiment configuration, opens the trial ledger and runs the
//! menu loop on the terminal. The optimizer client is created or restored on
//! first use and saved next to the ledger.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use seqdesign::engine::NativeEngine;
use seqdesign::session::{Session, StdConsole};
use seqdesign::storage::{CsvLedgerStore, SnapshotFile};
use seqdesign::ExperimentConfig;

/// Interactive sequential experiment design
///
/// Keeps a CSV ledger of trials and measured outputs in sync with a
/// Sobol + Gaussian-process optimizer. Start with a batch of Sobol trials,
/// record the measured outputs, then ask for model-based suggestions.
#[derive(Parser, Debug)]
#[command(name = "seqdesign")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli {
    /// Directory holding the configuration sheets as `<sheet>.csv`
    #[arg(long, value_name = "DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Trial ledger file
    #[arg(long, value_name = "FILE", default_value = "experiment_data.csv")]
    ledger: PathBuf,

    /// Optimizer snapshot file
    #[arg(long, value_name = "FILE", default_value = "engine_snapshot.json")]
    snapshot: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ExperimentConfig::load(&cli.config_dir).with_context(|| {
        format!("failed to load configuration from {}", cli.config_dir.display())
    })?;
    let store = CsvLedgerStore::new(&cli.ledger);
    let snapshot = SnapshotFile::new(&cli.snapshot);

    let mut session: Session<NativeEngine, _> = Session::new(config, store, snapshot)
        .with_context(|| format!("failed to open ledger {}", cli.ledger.display()))?;
    let code = session.run(&mut StdConsole)?;
    std::process::exit(code)
}
