//! Delta planning: turn a change set into signed adjustments.
//!
//! `delta = current - last_known`, where `last_known` is the snapshot quantity
//! for modified items and zero for new ones. Identifiers come from the
//! snapshot when known, otherwise from the target via the executor.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use restock_core::{
    AdjustmentPlan, ChangeKind, ChangeSet, DeletionPolicy, FailureReason, ItemFailure, Sku,
    Snapshot, TargetItemId,
};

use crate::executor::{RateLimitedExecutor, Resolution};

/// `current - last_known` as a signed delta, or `None` if it does not fit.
pub fn compute_delta(current: u64, last_known: u64) -> Option<i64> {
    let current = i64::try_from(current).ok()?;
    let last_known = i64::try_from(last_known).ok()?;
    current.checked_sub(last_known)
}

/// Everything the planner decided for one change set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOutcome {
    /// Nonzero plans, in submission order.
    pub plans: Vec<AdjustmentPlan>,
    /// Zero-delta plans; the target already matches.
    pub noops: Vec<AdjustmentPlan>,
    pub failures: Vec<ItemFailure>,
    /// Deleted SKUs dropped without a target call.
    pub dropped: Vec<Sku>,
    /// SKUs left unplanned because the run was cancelled while resolving.
    pub cancelled: Vec<Sku>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaPlanner {
    deletion_policy: DeletionPolicy,
}

impl DeltaPlanner {
    pub fn new(deletion_policy: DeletionPolicy) -> Self {
        Self { deletion_policy }
    }

    /// Plan new, then modified, then deleted items.
    ///
    /// `known` supplies cached identifiers for records classified as new;
    /// after a reset it is empty and every new record is resolved.
    pub async fn plan(
        &self,
        changes: &ChangeSet,
        known: &Snapshot,
        executor: &mut RateLimitedExecutor,
        cancel: &CancellationToken,
    ) -> PlanOutcome {
        let mut outcome = PlanOutcome::default();

        for record in &changes.new {
            if cancel.is_cancelled() {
                outcome.cancelled.push(record.sku.clone());
                continue;
            }
            let target_item_id = match known.get(&record.sku) {
                Some(entry) => entry.target_item_id.clone(),
                None => match executor.resolve_item(&record.sku, cancel).await {
                    Resolution::Found(id) => id,
                    Resolution::NotFound => {
                        warn!(sku = %record.sku, "SKU not found in target system");
                        outcome
                            .failures
                            .push(ItemFailure::new(record.sku.clone(), FailureReason::NotFoundInTarget));
                        continue;
                    }
                    Resolution::Failed(msg) => {
                        warn!(sku = %record.sku, error = %msg, "identifier lookup failed");
                        outcome.failures.push(ItemFailure::new(
                            record.sku.clone(),
                            FailureReason::ResolutionFailed(msg),
                        ));
                        continue;
                    }
                    Resolution::Cancelled => {
                        outcome.cancelled.push(record.sku.clone());
                        continue;
                    }
                },
            };
            self.push(
                &mut outcome,
                record.sku.clone(),
                target_item_id,
                compute_delta(record.quantity, 0),
                record.quantity,
                ChangeKind::New,
            );
        }

        for (record, prior) in &changes.modified {
            self.push(
                &mut outcome,
                record.sku.clone(),
                prior.target_item_id.clone(),
                compute_delta(record.quantity, prior.quantity),
                record.quantity,
                ChangeKind::Modified,
            );
        }

        for entry in &changes.deleted {
            match self.deletion_policy {
                DeletionPolicy::ZeroOut => self.push(
                    &mut outcome,
                    entry.sku.clone(),
                    entry.target_item_id.clone(),
                    compute_delta(0, entry.quantity),
                    0,
                    ChangeKind::Deleted,
                ),
                DeletionPolicy::Ignore => {
                    debug!(sku = %entry.sku, "deleted SKU ignored");
                    outcome.dropped.push(entry.sku.clone());
                }
            }
        }

        debug!(
            plans = outcome.plans.len(),
            noops = outcome.noops.len(),
            failures = outcome.failures.len(),
            "planning complete"
        );
        outcome
    }

    fn push(
        &self,
        outcome: &mut PlanOutcome,
        sku: Sku,
        target_item_id: TargetItemId,
        delta: Option<i64>,
        source_quantity: u64,
        kind: ChangeKind,
    ) {
        let Some(delta) = delta else {
            warn!(sku = %sku, quantity = source_quantity, "quantity does not fit a signed delta");
            outcome
                .failures
                .push(ItemFailure::new(sku, FailureReason::QuantityOutOfRange));
            return;
        };
        let plan = AdjustmentPlan {
            sku,
            target_item_id,
            delta,
            source_quantity,
            kind,
        };
        if delta == 0 {
            outcome.noops.push(plan);
        } else {
            outcome.plans.push(plan);
        }
    }
}
