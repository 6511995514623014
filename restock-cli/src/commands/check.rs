//! `restock check`: verify both collaborators are reachable.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use restock_core::Sku;
use restock_sync::{InventorySource, TargetSystem};

use crate::app::{block_on, App};

/// Arguments for `restock check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// SKU used for the target lookup probe (defaults to the first source record).
    #[arg(long)]
    pub sku: Option<String>,
}

impl CheckArgs {
    pub fn run(self, app: &App) -> Result<()> {
        let source = app.source()?;
        let target = app.target()?;

        let (source_result, target_result) = block_on(async move {
            let listing = source.fetch_inventory().await;
            let probe = self
                .sku
                .map(Sku::from)
                .or_else(|| {
                    listing
                        .as_ref()
                        .ok()
                        .and_then(|records| records.first())
                        .map(|r| r.sku.clone())
                })
                .unwrap_or_else(|| Sku::from("restock-probe"));
            let lookup = target.resolve_item(&probe).await.map(|id| (probe, id));
            (listing, lookup)
        })?;

        let mut healthy = true;
        match source_result {
            Ok(records) => println!("{} source: {} records", "✓".green().bold(), records.len()),
            Err(err) => {
                healthy = false;
                println!("{} source: {err}", "✗".red().bold());
            }
        }
        match target_result {
            Ok((sku, Some(id))) => {
                println!("{} target: '{sku}' resolves to {id}", "✓".green().bold())
            }
            Ok((sku, None)) => println!(
                "{} target: reachable ('{sku}' not found)",
                "✓".green().bold()
            ),
            Err(err) => {
                healthy = false;
                println!("{} target: {err}", "✗".red().bold());
            }
        }

        if !healthy {
            bail!("connection check failed");
        }
        Ok(())
    }
}
