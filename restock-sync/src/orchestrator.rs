//! End-to-end reconciliation run.
//!
//! ```text
//! IDLE → LOADING_SNAPSHOT → DETECTING_CHANGES → NO_CHANGES
//!                                             ↘ PLANNING → EXECUTING_BATCHES → FINALIZING_SNAPSHOT → DONE
//! (any stage) → FAILED
//! ```
//!
//! One run at a time: a second `run` or `reset` while a run holds the lock
//! fails with [`ReconcileError::ConcurrentRun`].

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use restock_core::{
    AdjustmentPlan, AppliedItem, ChangeKind, ChangeSet, Config, DeletionPolicy, ItemFailure, Sku,
    Snapshot, SnapshotEntry, MAX_BATCH_SIZE,
};

use crate::batch::BatchScheduler;
use crate::collaborators::{InventorySource, TargetSystem};
use crate::detector;
use crate::error::{BatchLimitError, ReconcileError, StorageError};
use crate::executor::{BatchResult, ExecutionStats, ItemOutcome, RateLimitedExecutor, RetryPolicy};
use crate::planner::DeltaPlanner;
use crate::snapshot_store::{SnapshotInfo, SnapshotStore};

// ---------------------------------------------------------------------------
// State and summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    LoadingSnapshot,
    DetectingChanges,
    NoChanges,
    Planning,
    ExecutingBatches,
    FinalizingSnapshot,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::NoChanges | RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::LoadingSnapshot => "loading_snapshot",
            RunState::DetectingChanges => "detecting_changes",
            RunState::NoChanges => "no_changes",
            RunState::Planning => "planning",
            RunState::ExecutingBatches => "executing_batches",
            RunState::FinalizingSnapshot => "finalizing_snapshot",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a run did.
///
/// Every changed SKU lands in exactly one bucket:
/// `total == successful + failed + skipped + noop + ignored`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncSummary {
    /// Changed SKUs (new + modified + deleted).
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Never submitted because the run was cancelled.
    pub skipped: usize,
    /// Zero-delta changes committed without a target call.
    pub noop: usize,
    /// Deleted SKUs dropped under the `ignore` policy.
    pub ignored: usize,
    pub new: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Bulk calls submitted.
    pub batches: usize,
    pub elapsed_secs: f64,
    pub snapshot_updated: bool,
    /// Items the target confirmed, in submission order.
    pub applied: Vec<AppliedItem>,
    pub failures: Vec<ItemFailure>,
    pub stats: ExecutionStats,
    pub cancelled: bool,
    pub forced: bool,
}

impl SyncSummary {
    /// No failures and nothing left behind.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && !self.cancelled
    }
}

/// Engine knobs taken from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub batch_size: usize,
    pub deletion_policy: DeletionPolicy,
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            deletion_policy: DeletionPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size,
            deletion_policy: config.deletion_policy,
            retry: RetryPolicy::from_settings(&config.retry),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct ReconciliationOrchestrator {
    store: SnapshotStore,
    source: Arc<dyn InventorySource>,
    target: Arc<dyn TargetSystem>,
    scheduler: BatchScheduler,
    planner: DeltaPlanner,
    retry: RetryPolicy,
    run_lock: Mutex<()>,
    state: watch::Sender<RunState>,
}

impl ReconciliationOrchestrator {
    pub fn new(
        store: SnapshotStore,
        source: Arc<dyn InventorySource>,
        target: Arc<dyn TargetSystem>,
        settings: EngineSettings,
    ) -> Result<Self, BatchLimitError> {
        let (state, _) = watch::channel(RunState::Idle);
        Ok(Self {
            store,
            source,
            target,
            scheduler: BatchScheduler::new(settings.batch_size)?,
            planner: DeltaPlanner::new(settings.deletion_policy),
            retry: settings.retry,
            run_lock: Mutex::new(()),
            state,
        })
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Observe state transitions of current and future runs.
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Run one reconciliation. `force` diffs against an empty snapshot.
    pub async fn run(&self, force: bool) -> Result<SyncSummary, ReconcileError> {
        self.run_with_cancel(force, &CancellationToken::new()).await
    }

    /// Like [`run`](Self::run); cancelling `cancel` stops batch submission and
    /// finalizes with whatever completed.
    pub async fn run_with_cancel(
        &self,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<SyncSummary, ReconcileError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| ReconcileError::ConcurrentRun)?;

        let started = Instant::now();
        let result = self.run_locked(force, cancel, started).await;
        match &result {
            Ok(summary) => {
                if self.state() != RunState::NoChanges {
                    self.transition(RunState::Done);
                }
                info!(
                    total = summary.total,
                    successful = summary.successful,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    noop = summary.noop,
                    batches = summary.batches,
                    elapsed_secs = summary.elapsed_secs,
                    "reconciliation finished"
                );
            }
            Err(err) => {
                self.transition(RunState::Failed);
                error!(error = %err, "reconciliation failed");
            }
        }
        result
    }

    async fn run_locked(
        &self,
        force: bool,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<SyncSummary, ReconcileError> {
        self.transition(RunState::LoadingSnapshot);
        let stored = self.load_snapshot().await?;

        self.transition(RunState::DetectingChanges);
        let records = self.source.fetch_inventory().await?;
        detector::ensure_unique_skus(&records)?;
        let empty = Snapshot::empty();
        let baseline = if force { &empty } else { &stored };
        let changes = detector::compare(&records, baseline);

        let mut summary = SyncSummary {
            total: changes.total_changes(),
            new: changes.new.len(),
            modified: changes.modified.len(),
            deleted: changes.deleted.len(),
            unchanged: changes.unchanged_count,
            forced: force,
            ..Default::default()
        };
        info!(
            new = summary.new,
            modified = summary.modified,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            estimated_batches = changes.estimated_batches(self.scheduler.limit()),
            "changes detected"
        );

        if changes.is_empty() {
            self.transition(RunState::NoChanges);
            summary.elapsed_secs = started.elapsed().as_secs_f64();
            return Ok(summary);
        }

        self.transition(RunState::Planning);
        let mut executor = RateLimitedExecutor::new(Arc::clone(&self.target), self.retry.clone());
        let planned = self
            .planner
            .plan(&changes, &stored, &mut executor, cancel)
            .await;
        let batches = self.scheduler.partition(planned.plans)?;

        self.transition(RunState::ExecutingBatches);
        let mut results = Vec::with_capacity(batches.len());
        for batch in &batches {
            if cancel.is_cancelled() {
                info!(
                    remaining = batches.len() - results.len(),
                    "cancellation requested; no further batches"
                );
                break;
            }
            let result = executor.execute(batch, cancel).await;
            if result.is_fully_failed() {
                warn!(
                    batch = result.index,
                    items = result.outcomes.len(),
                    "every item in batch failed; snapshot entries kept for next run"
                );
            }
            results.push(result);
        }
        let unsubmitted: usize = batches[results.len()..].iter().map(|b| b.len()).sum();

        self.transition(RunState::FinalizingSnapshot);
        let finalized = finalize(stored, &planned.noops, &planned.dropped, &results, Utc::now());

        summary.batches = results.len();
        summary.noop = planned.noops.len();
        summary.ignored = planned.dropped.len();
        summary.failures = planned.failures;
        summary.skipped = planned.cancelled.len() + unsubmitted;
        for result in &results {
            summary.successful += result.applied();
            summary.skipped += result.skipped();
            summary.failures.extend(result.outcomes.iter().filter_map(|(plan, outcome)| {
                match outcome {
                    ItemOutcome::Failed(reason) => {
                        Some(ItemFailure::new(plan.sku.clone(), reason.clone()))
                    }
                    _ => None,
                }
            }));
        }
        summary.failed = summary.failures.len();
        summary.cancelled = cancel.is_cancelled() && summary.skipped > 0;
        summary.stats = executor.into_stats();
        summary.applied = finalized.applied;

        if finalized.committed == 0 {
            // Rewriting an identical document would only rotate history away.
            info!("nothing committed; snapshot left as is");
            summary.elapsed_secs = started.elapsed().as_secs_f64();
            return Ok(summary);
        }
        let saved = self.save_snapshot(finalized.snapshot).await?;
        summary.elapsed_secs = started.elapsed().as_secs_f64();
        if let Err(source) = saved {
            error!(error = %source, "snapshot not written; next run repeats this diff");
            return Err(ReconcileError::Finalize {
                source,
                summary: Box::new(summary),
            });
        }
        summary.snapshot_updated = true;
        Ok(summary)
    }

    /// Diff the current listing against the stored snapshot. No target calls,
    /// no lock.
    pub async fn preview(&self) -> Result<ChangeSet, ReconcileError> {
        let stored = self.load_snapshot().await?;
        let records = self.source.fetch_inventory().await?;
        detector::ensure_unique_skus(&records)?;
        Ok(detector::compare(&records, &stored))
    }

    /// Clear the snapshot so the next run treats every record as new.
    pub async fn reset(&self) -> Result<bool, ReconcileError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| ReconcileError::ConcurrentRun)?;
        let store = self.store.clone();
        let removed = tokio::task::spawn_blocking(move || store.reset())
            .await
            .map_err(|e| ReconcileError::Internal(e.to_string()))??;
        Ok(removed)
    }

    pub async fn info(&self) -> Result<SnapshotInfo, ReconcileError> {
        let store = self.store.clone();
        let info = tokio::task::spawn_blocking(move || store.info())
            .await
            .map_err(|e| ReconcileError::Internal(e.to_string()))??;
        Ok(info)
    }

    async fn load_snapshot(&self) -> Result<Snapshot, ReconcileError> {
        let store = self.store.clone();
        let snapshot = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| ReconcileError::Internal(e.to_string()))??;
        Ok(snapshot)
    }

    /// Outer error: the blocking task itself failed. Inner: the write failed.
    async fn save_snapshot(
        &self,
        snapshot: Snapshot,
    ) -> Result<Result<(), StorageError>, ReconcileError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(|e| ReconcileError::Internal(e.to_string()))
    }

    fn transition(&self, next: RunState) {
        info!(state = %next, "run state");
        self.state.send_replace(next);
    }
}

// ---------------------------------------------------------------------------
// Finalization
// ---------------------------------------------------------------------------

/// Next snapshot plus what it commits.
struct Finalized {
    snapshot: Snapshot,
    applied: Vec<AppliedItem>,
    /// Entries written or removed relative to `base`.
    committed: usize,
}

/// Build the next snapshot from `base`.
///
/// Applied plans and no-ops are committed; dropped SKUs are removed. Every
/// other entry (failed, skipped, untouched) carries forward unchanged.
fn finalize(
    mut base: Snapshot,
    noops: &[AdjustmentPlan],
    dropped: &[Sku],
    results: &[BatchResult],
    now: DateTime<Utc>,
) -> Finalized {
    let applied: Vec<&AdjustmentPlan> = results
        .iter()
        .flat_map(|r| {
            r.outcomes
                .iter()
                .filter(|(_, o)| matches!(o, ItemOutcome::Applied))
                .map(|(plan, _)| plan)
        })
        .collect();
    for plan in noops.iter().chain(applied.iter().copied()) {
        match plan.kind {
            ChangeKind::Deleted => {
                base.remove(&plan.sku);
            }
            ChangeKind::New | ChangeKind::Modified => base.insert(SnapshotEntry {
                sku: plan.sku.clone(),
                quantity: plan.source_quantity,
                target_item_id: plan.target_item_id.clone(),
                synced_at: now,
            }),
        }
    }
    for sku in dropped {
        base.remove(sku);
    }
    base.taken_at = now;
    Finalized {
        committed: applied.len() + noops.len() + dropped.len(),
        applied: applied.into_iter().map(AppliedItem::from).collect(),
        snapshot: base,
    }
}
