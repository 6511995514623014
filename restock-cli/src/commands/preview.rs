//! `restock preview`: what the next run would change. No target calls.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use restock_core::{ChangeSet, SyncEstimate};
use restock_sync::{detector, InventorySource};

use crate::app::{block_on, App};

/// Arguments for `restock preview`.
#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// Maximum number of SKUs listed per category in table output.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Serialize)]
struct PreviewJson<'a> {
    new: usize,
    modified: usize,
    deleted: usize,
    unchanged: usize,
    estimated_batches: usize,
    estimated_api_calls: usize,
    estimated_duration_secs: f64,
    changes: &'a ChangeSet,
}

#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "sku")]
    sku: String,
    #[tabled(rename = "change")]
    change: &'static str,
    #[tabled(rename = "snapshot")]
    before: String,
    #[tabled(rename = "source")]
    after: String,
}

impl PreviewArgs {
    pub fn run(self, app: &App) -> Result<()> {
        let store = app.store();
        let source = app.source()?;
        let changes = block_on(async move {
            let stored = tokio::task::spawn_blocking(move || store.load()).await??;
            let records = source.fetch_inventory().await?;
            detector::ensure_unique_skus(&records)?;
            anyhow::Ok(detector::compare(&records, &stored))
        })?
        .context("preview failed")?;
        let SyncEstimate {
            batches: estimated_batches,
            api_calls,
            duration_secs,
        } = changes.estimate(app.config.batch_size);

        if self.json {
            let payload = PreviewJson {
                new: changes.new.len(),
                modified: changes.modified.len(),
                deleted: changes.deleted.len(),
                unchanged: changes.unchanged_count,
                estimated_batches,
                estimated_api_calls: api_calls,
                estimated_duration_secs: (duration_secs * 10.0).round() / 10.0,
                changes: &changes,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize preview")?
            );
            return Ok(());
        }

        if changes.is_empty() {
            println!(
                "{} in sync ({} unchanged)",
                "✓".green().bold(),
                changes.unchanged_count
            );
            return Ok(());
        }

        println!(
            "{} new, {} modified, {} deleted, {} unchanged → ~{} batch(es), ~{} API call(s), ~{:.1}s",
            changes.new.len(),
            changes.modified.len(),
            changes.deleted.len(),
            changes.unchanged_count,
            estimated_batches,
            api_calls,
            duration_secs
        );

        let mut rows: Vec<ChangeRow> = Vec::new();
        rows.extend(changes.new.iter().take(self.limit).map(|r| ChangeRow {
            sku: r.sku.to_string(),
            change: "new",
            before: "-".to_string(),
            after: r.quantity.to_string(),
        }));
        rows.extend(changes.modified.iter().take(self.limit).map(|(r, prior)| ChangeRow {
            sku: r.sku.to_string(),
            change: "modified",
            before: prior.quantity.to_string(),
            after: r.quantity.to_string(),
        }));
        rows.extend(changes.deleted.iter().take(self.limit).map(|e| ChangeRow {
            sku: e.sku.to_string(),
            change: "deleted",
            before: e.quantity.to_string(),
            after: "-".to_string(),
        }));
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");

        let hidden = changes.total_changes().saturating_sub(
            changes.new.len().min(self.limit)
                + changes.modified.len().min(self.limit)
                + changes.deleted.len().min(self.limit),
        );
        if hidden > 0 {
            println!("{}", format!("… and {hidden} more").bright_black());
        }
        Ok(())
    }
}
