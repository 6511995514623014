//! `restock watch`: periodic pull loop.
//!
//! Ctrl-C cancels the in-flight run; the run still finalizes its snapshot
//! before the loop exits.

use std::time::Duration;

use anyhow::Result;
use clap::Args;

use restock_sync::{CancellationToken, ReconcileError, ReconciliationOrchestrator, SyncSummary};

use crate::app::{block_on, App};
use crate::commands::run::print_summary;

/// Arguments for `restock watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Seconds between the end of one run and the start of the next.
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub every: u64,

    /// Emit each summary as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Result of one loop iteration.
#[derive(Debug)]
pub(crate) enum Tick {
    Completed(SyncSummary),
    /// Another run held the lock; nothing happened.
    Rejected,
    Failed(ReconcileError),
}

impl WatchArgs {
    pub fn run(self, app: &App) -> Result<()> {
        let orchestrator = app.orchestrator()?;
        let every = Duration::from_secs(self.every);
        let json = self.json;

        block_on(async move {
            let cancel = CancellationToken::new();
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::info!("received ctrl-c; stopping after the current run");
                        cancel.cancel();
                    }
                }
            });

            watch_loop(&orchestrator, every, &cancel, |tick| match tick {
                Tick::Completed(summary) => print_summary(&summary, json, false),
                Tick::Failed(ReconcileError::Finalize { summary, .. }) => {
                    print_summary(&summary, json, false)
                }
                Tick::Rejected | Tick::Failed(_) => Ok(()),
            })
            .await
        })?
    }
}

/// Run, report, sleep `every`, repeat until `cancel` fires.
///
/// A cancelled run still finalizes and is reported before the loop returns.
pub(crate) async fn watch_loop<F>(
    orchestrator: &ReconciliationOrchestrator,
    every: Duration,
    cancel: &CancellationToken,
    mut on_tick: F,
) -> Result<()>
where
    F: FnMut(Tick) -> Result<()>,
{
    tracing::info!(every_secs = every.as_secs(), "watch loop started");
    loop {
        let tick = match orchestrator.run_with_cancel(false, cancel).await {
            Ok(summary) => Tick::Completed(summary),
            Err(ReconcileError::ConcurrentRun) => {
                tracing::warn!("previous run still active; retrying next tick");
                Tick::Rejected
            }
            Err(err @ ReconcileError::Finalize { .. }) => {
                tracing::error!(error = %err, "snapshot not saved; next run repeats the diff");
                Tick::Failed(err)
            }
            Err(err) => {
                tracing::error!(error = %err, "run failed; retrying next tick");
                Tick::Failed(err)
            }
        };
        on_tick(tick)?;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(every) => {}
        }
    }
    tracing::info!("watch loop stopped");
    Ok(())
}
