//! restock: inventory reconciliation CLI.
//!
//! # Usage
//!
//! ```text
//! restock run [--force] [--json] [--verbose]
//! restock preview [--json] [--limit N]
//! restock info [--json]
//! restock reset
//! restock watch [--every SECS] [--json]
//! restock check [--sku SKU]
//! ```
//!
//! Global: `--config <path>` (default `~/.restock/config.yaml`).

mod app;
mod commands;
mod logging;
mod source;
mod target;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use app::App;
use commands::{
    check::CheckArgs, info::InfoArgs, preview::PreviewArgs, reset::ResetArgs, run::RunArgs,
    watch::WatchArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "restock",
    version,
    about = "Push inventory changes from a source listing to a target system",
    long_about = None,
)]
struct Cli {
    /// Configuration file to use instead of ~/.restock/config.yaml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one reconciliation and print the summary.
    Run(RunArgs),

    /// Show what the next run would change, without contacting the target.
    Preview(PreviewArgs),

    /// Show the stored snapshot's state.
    Info(InfoArgs),

    /// Clear the stored snapshot so the next run syncs everything.
    Reset(ResetArgs),

    /// Reconcile periodically until interrupted.
    Watch(WatchArgs),

    /// Check that the source and target are reachable.
    Check(CheckArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let app = App::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Run(args) => args.run(&app),
        Commands::Preview(args) => args.run(&app),
        Commands::Info(args) => args.run(&app),
        Commands::Reset(args) => args.run(&app),
        Commands::Watch(args) => args.run(&app),
        Commands::Check(args) => args.run(&app),
    }
}
