//! `restock run`: one reconciliation pass.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use restock_sync::{ReconcileError, SyncSummary};

use crate::app::{block_on, App};

/// Arguments for `restock run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Ignore the stored snapshot and push every record as new.
    #[arg(long)]
    pub force: bool,

    /// Emit the summary as JSON.
    #[arg(long)]
    pub json: bool,

    /// List every applied item with its new quantity and delta.
    #[arg(long, short)]
    pub verbose: bool,
}

impl RunArgs {
    pub fn run(self, app: &App) -> Result<()> {
        let orchestrator = app.orchestrator()?;
        let outcome = block_on(orchestrator.run(self.force))?;

        let summary = match outcome {
            Ok(summary) => summary,
            Err(ReconcileError::Finalize { source, summary }) => {
                print_summary(&summary, self.json, self.verbose)?;
                return Err(source).context("target updated but snapshot could not be saved");
            }
            Err(err) => return Err(err).context("reconciliation failed"),
        };

        print_summary(&summary, self.json, self.verbose)?;
        if summary.failed > 0 {
            bail!("{} item(s) failed to sync", summary.failed);
        }
        Ok(())
    }
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "")]
    label: &'static str,
    #[tabled(rename = "count")]
    count: usize,
}

#[derive(Tabled)]
struct AppliedRow {
    #[tabled(rename = "sku")]
    sku: String,
    #[tabled(rename = "quantity")]
    quantity: u64,
    #[tabled(rename = "delta")]
    delta: String,
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "sku")]
    sku: String,
    #[tabled(rename = "reason")]
    reason: String,
}

pub(crate) fn print_summary(summary: &SyncSummary, json: bool, verbose: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(summary).context("failed to serialize summary")?
        );
        return Ok(());
    }

    if summary.total == 0 {
        println!(
            "{} nothing to sync ({} unchanged)",
            "✓".green().bold(),
            summary.unchanged
        );
        return Ok(());
    }

    let headline = format!(
        "{} synced, {} failed, {} skipped in {} batch(es), {:.1}s",
        summary.successful, summary.failed, summary.skipped, summary.batches, summary.elapsed_secs
    );
    if summary.is_clean() {
        println!("{} {headline}", "✓".green().bold());
    } else {
        println!("{} {headline}", "✗".red().bold());
    }
    if summary.forced {
        println!("{}", "(forced full resync)".bright_black());
    }
    if summary.cancelled {
        println!("{}", "run cancelled; remaining items will sync next run".yellow());
    }

    let rows = vec![
        CountRow { label: "new", count: summary.new },
        CountRow { label: "modified", count: summary.modified },
        CountRow { label: "deleted", count: summary.deleted },
        CountRow { label: "unchanged", count: summary.unchanged },
        CountRow { label: "no-op", count: summary.noop },
        CountRow { label: "ignored", count: summary.ignored },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if verbose && !summary.applied.is_empty() {
        let rows: Vec<AppliedRow> = summary
            .applied
            .iter()
            .map(|item| AppliedRow {
                sku: item.sku.to_string(),
                quantity: item.quantity,
                delta: format!("{:+}", item.delta),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    if !summary.failures.is_empty() {
        let rows: Vec<FailureRow> = summary
            .failures
            .iter()
            .map(|f| FailureRow {
                sku: f.sku.to_string(),
                reason: f.reason.to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    println!(
        "{} target calls, {} retries",
        summary.stats.calls, summary.stats.retries
    );
    if let Some(budget) = &summary.stats.throttle_remaining {
        println!("throttle budget remaining: {}", budget.remaining);
    }
    if !summary.snapshot_updated {
        println!("{}", "snapshot not updated".yellow());
    }
    Ok(())
}
