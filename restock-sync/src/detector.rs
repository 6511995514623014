//! Change detection: classify a fresh listing against the stored snapshot.
//!
//! Pure and synchronous. `preview` and `run` both go through [`compare`].

use std::collections::HashSet;

use restock_core::{ChangeSet, InventoryRecord, Snapshot};

use crate::error::SourceError;

/// Classify `current` against `snapshot`.
///
/// - absent from the snapshot → new
/// - present with a different quantity → modified
/// - present with an equal quantity → unchanged
/// - snapshot entries missing from `current` → deleted
///
/// New and modified keep fetch order; deleted follows snapshot key order.
pub fn compare(current: &[InventoryRecord], snapshot: &Snapshot) -> ChangeSet {
    let mut changes = ChangeSet::default();
    let mut seen = HashSet::with_capacity(current.len());

    for record in current {
        seen.insert(&record.sku);
        match snapshot.get(&record.sku) {
            None => changes.new.push(record.clone()),
            Some(prior) if prior.quantity != record.quantity => {
                changes.modified.push((record.clone(), prior.clone()));
            }
            Some(_) => changes.unchanged_count += 1,
        }
    }

    changes.deleted = snapshot
        .entries
        .values()
        .filter(|entry| !seen.contains(&entry.sku))
        .cloned()
        .collect();

    changes
}

/// Reject a listing that repeats a SKU.
pub fn ensure_unique_skus(current: &[InventoryRecord]) -> Result<(), SourceError> {
    let mut seen = HashSet::with_capacity(current.len());
    for record in current {
        if !seen.insert(&record.sku) {
            return Err(SourceError::DuplicateSku(record.sku.clone()));
        }
    }
    Ok(())
}
