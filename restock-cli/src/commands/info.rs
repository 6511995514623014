//! `restock info`: state of the stored snapshot.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::app::App;

/// Arguments for `restock info`.
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl InfoArgs {
    pub fn run(self, app: &App) -> Result<()> {
        let info = app.store().info().context("failed to inspect snapshot")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("failed to serialize snapshot info")?
            );
            return Ok(());
        }

        println!("snapshot: {}", info.path.display());
        if !info.exists {
            println!("{} no snapshot yet; the next run syncs everything", "■".bright_black());
            return Ok(());
        }
        if info.corrupted {
            println!(
                "{} corrupted ({}); the next run falls back to a full resync",
                "■".red().bold(),
                info.corruption.as_deref().unwrap_or("unknown reason")
            );
        } else {
            let taken = info
                .taken_at
                .map(|t| format!("{} ({})", t.to_rfc3339(), format_age(t)))
                .unwrap_or_else(|| "unknown".to_string());
            println!("{} {} entries, taken {taken}", "■".green().bold(), info.entries);
        }
        println!(
            "size: {:.1} KiB, {} backup(s)",
            info.file_size_bytes as f64 / 1024.0,
            info.backups
        );
        Ok(())
    }
}

fn format_age(at: chrono::DateTime<chrono::Utc>) -> String {
    let secs = (chrono::Utc::now() - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
