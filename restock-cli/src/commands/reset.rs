//! `restock reset`: forget the stored snapshot.

use anyhow::{Context, Result};
use clap::Args;

use crate::app::App;

/// Arguments for `restock reset`.
#[derive(Args, Debug)]
pub struct ResetArgs {}

impl ResetArgs {
    pub fn run(self, app: &App) -> Result<()> {
        let store = app.store();
        if store.reset().context("failed to reset snapshot")? {
            println!(
                "snapshot cleared (previous copy kept at {}); the next run syncs everything",
                store.backup_path(1).display()
            );
        } else {
            println!("no snapshot to reset");
        }
        Ok(())
    }
}
