//! restock core library: domain types, configuration, errors.
//!
//! - [`types`]: inventory records, snapshots, change sets, plans
//! - [`config`]: `~/.restock/config.yaml` loading
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use types::{
    AdjustmentPlan, AppliedItem, ChangeKind, ChangeSet, DeletionPolicy, FailureReason,
    InventoryRecord, ItemFailure, RecordOrigin, Sku, Snapshot, SnapshotEntry, SyncEstimate,
    TargetItemId, ThrottleBudget,
};

/// Bulk-operation ceiling of the target system. Hard limit, not a tuning knob.
pub const MAX_BATCH_SIZE: usize = 250;
