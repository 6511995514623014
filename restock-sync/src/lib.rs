//! # restock-sync
//!
//! Snapshot-based inventory reconciliation engine.
//!
//! Build a [`ReconciliationOrchestrator`] from a [`SnapshotStore`], an
//! [`InventorySource`] and a [`TargetSystem`], then call
//! [`ReconciliationOrchestrator::run`]. Only changes since the last successful
//! run reach the target; items that fail keep their previous snapshot entry
//! and are retried by the next run.

pub mod batch;
pub mod collaborators;
pub mod detector;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod snapshot_store;

pub use batch::{Batch, BatchScheduler};
pub use collaborators::{BulkAdjustResponse, InventorySource, ItemRejection, TargetSystem};
pub use error::{
    BatchLimitError, ReconcileError, SnapshotCorruption, SourceError, StorageError, TargetError,
};
pub use executor::{
    BatchResult, ExecutionStats, ItemOutcome, RateLimitedExecutor, Resolution, RetryPolicy,
};
pub use orchestrator::{EngineSettings, ReconciliationOrchestrator, RunState, SyncSummary};
pub use planner::{DeltaPlanner, PlanOutcome};
pub use snapshot_store::{SnapshotInfo, SnapshotStore};

pub use tokio_util::sync::CancellationToken;
