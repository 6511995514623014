//! Domain types for inventory reconciliation.
//!
//! Plain data only: every type here is serializable and free of I/O.
//! Snapshot entries are keyed by [`Sku`] in a `BTreeMap` so serialized
//! documents have a deterministic order.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stock keeping unit: the stable item identifier shared by both systems.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(pub String);

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Sku {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Sku {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of an item inside the target system (opaque to us).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetItemId(pub String);

impl fmt::Display for TargetItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TargetItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TargetItemId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Source records
// ---------------------------------------------------------------------------

/// Where a record came from in the source system. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordOrigin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// One line of the current inventory listing, fetched fresh every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub sku: Sku,
    pub quantity: u64,
    #[serde(default)]
    pub origin: RecordOrigin,
}

impl InventoryRecord {
    pub fn new(sku: impl Into<Sku>, quantity: u64) -> Self {
        Self {
            sku: sku.into(),
            quantity,
            origin: RecordOrigin::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Last-known synchronized state of a single SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub sku: Sku,
    pub quantity: u64,
    pub target_item_id: TargetItemId,
    pub synced_at: DateTime<Utc>,
}

/// Last successfully synchronized state, keyed by SKU.
///
/// A loaded snapshot is treated as read-only for the duration of a run; the
/// orchestrator derives a new one with [`Snapshot::clone`] + mutation and
/// hands that to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub entries: BTreeMap<Sku, SnapshotEntry>,
}

impl Snapshot {
    /// Snapshot with no entries: every record compared against it is new.
    pub fn empty() -> Self {
        Self {
            taken_at: Utc::now(),
            entries: BTreeMap::new(),
        }
    }

    /// Build a snapshot from entries. A later entry with the same SKU replaces
    /// an earlier one.
    pub fn from_entries(
        taken_at: DateTime<Utc>,
        entries: impl IntoIterator<Item = SnapshotEntry>,
    ) -> Self {
        Self {
            taken_at,
            entries: entries.into_iter().map(|e| (e.sku.clone(), e)).collect(),
        }
    }

    pub fn get(&self, sku: &Sku) -> Option<&SnapshotEntry> {
        self.entries.get(sku)
    }

    pub fn insert(&mut self, entry: SnapshotEntry) {
        self.entries.insert(entry.sku.clone(), entry);
    }

    pub fn remove(&mut self, sku: &Sku) -> Option<SnapshotEntry> {
        self.entries.remove(sku)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

// ---------------------------------------------------------------------------
// Change detection and planning
// ---------------------------------------------------------------------------

/// Classification of the current listing against the stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ChangeSet {
    pub new: Vec<InventoryRecord>,
    pub modified: Vec<(InventoryRecord, SnapshotEntry)>,
    pub deleted: Vec<SnapshotEntry>,
    pub unchanged_count: usize,
}

impl ChangeSet {
    pub fn total_changes(&self) -> usize {
        self.new.len() + self.modified.len() + self.deleted.len()
    }

    /// `true` when nothing needs to reach the target system.
    pub fn is_empty(&self) -> bool {
        self.total_changes() == 0
    }

    /// Upper bound on the number of bulk calls a run would need.
    pub fn estimated_batches(&self, batch_size: usize) -> usize {
        if batch_size == 0 {
            return 0;
        }
        self.total_changes().div_ceil(batch_size)
    }

    /// Rough cost of syncing this change set. New SKUs need an identifier
    /// lookup each; modified and deleted ones reuse the cached identifier.
    pub fn estimate(&self, batch_size: usize) -> SyncEstimate {
        let batches = self.estimated_batches(batch_size);
        let lookups = self.new.len();
        SyncEstimate {
            batches,
            api_calls: lookups + batches,
            duration_secs: lookups as f64 * LOOKUP_SECS + batches as f64 * BULK_CALL_SECS,
        }
    }
}

const LOOKUP_SECS: f64 = 0.2;
const BULK_CALL_SECS: f64 = 1.0;

/// Expected target traffic for a change set, shown by `preview`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SyncEstimate {
    pub batches: usize,
    pub api_calls: usize,
    pub duration_secs: f64,
}

/// Which change category a plan originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    New,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::New => write!(f, "new"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// A signed quantity adjustment for one item in the target system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentPlan {
    pub sku: Sku,
    pub target_item_id: TargetItemId,
    pub delta: i64,
    /// Quantity the source reports; becomes the snapshot quantity on success.
    pub source_quantity: u64,
    pub kind: ChangeKind,
}

/// What to do with SKUs that disappeared from the source listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionPolicy {
    /// Emit a plan that drives the target quantity to zero.
    #[default]
    ZeroOut,
    /// Emit nothing; the entry is dropped from the next snapshot.
    Ignore,
}

impl fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeletionPolicy::ZeroOut => write!(f, "zero_out"),
            DeletionPolicy::Ignore => write!(f, "ignore"),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why an item did not reach the target system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The SKU does not exist in the target system.
    NotFoundInTarget,
    /// Identifier lookup failed for a reason other than "not found".
    ResolutionFailed(String),
    /// The target accepted the batch but refused this item.
    Rejected(String),
    /// Every attempt for the item's batch hit a transient failure.
    RetriesExhausted(String),
    /// The batch failed with a non-retryable transport error.
    BatchRejected(String),
    /// The quantity cannot be expressed as a signed delta.
    QuantityOutOfRange,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NotFoundInTarget => write!(f, "not found in target system"),
            FailureReason::ResolutionFailed(msg) => write!(f, "identifier lookup failed: {msg}"),
            FailureReason::Rejected(msg) => write!(f, "rejected by target: {msg}"),
            FailureReason::RetriesExhausted(msg) => write!(f, "retries exhausted: {msg}"),
            FailureReason::BatchRejected(msg) => write!(f, "batch rejected: {msg}"),
            FailureReason::QuantityOutOfRange => write!(f, "quantity out of range"),
        }
    }
}

/// An adjustment the target confirmed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedItem {
    pub sku: Sku,
    /// Quantity now recorded for the SKU.
    pub quantity: u64,
    pub delta: i64,
}

impl From<&AdjustmentPlan> for AppliedItem {
    fn from(plan: &AdjustmentPlan) -> Self {
        Self {
            sku: plan.sku.clone(),
            quantity: plan.source_quantity,
            delta: plan.delta,
        }
    }
}

/// A per-item failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub sku: Sku,
    pub reason: FailureReason,
}

impl ItemFailure {
    pub fn new(sku: impl Into<Sku>, reason: FailureReason) -> Self {
        Self {
            sku: sku.into(),
            reason,
        }
    }
}

/// Rate-limit signal reported by the target system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleBudget {
    pub remaining: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_rate: Option<f64>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
