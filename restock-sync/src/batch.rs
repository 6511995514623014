//! Order-preserving partitioning of plans into bulk-call sized batches.

use restock_core::{AdjustmentPlan, MAX_BATCH_SIZE};

use crate::error::BatchLimitError;

/// Plans submitted together in one bulk call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based position in the run.
    pub index: usize,
    items: Vec<AdjustmentPlan>,
}

impl Batch {
    /// Fails when `items` exceeds the bulk ceiling; never truncates.
    pub fn new(index: usize, items: Vec<AdjustmentPlan>) -> Result<Self, BatchLimitError> {
        if items.len() > MAX_BATCH_SIZE {
            return Err(BatchLimitError {
                requested: items.len(),
                limit: MAX_BATCH_SIZE,
            });
        }
        Ok(Self { index, items })
    }

    pub fn items(&self) -> &[AdjustmentPlan] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Splits plans into batches of at most `limit` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchScheduler {
    limit: usize,
}

impl BatchScheduler {
    /// `limit` must lie in `1..=MAX_BATCH_SIZE`.
    pub fn new(limit: usize) -> Result<Self, BatchLimitError> {
        if limit == 0 || limit > MAX_BATCH_SIZE {
            return Err(BatchLimitError {
                requested: limit,
                limit: MAX_BATCH_SIZE,
            });
        }
        Ok(Self { limit })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Partition `plans` in input order. The last batch may be short.
    pub fn partition(&self, plans: Vec<AdjustmentPlan>) -> Result<Vec<Batch>, BatchLimitError> {
        let mut batches = Vec::with_capacity(plans.len().div_ceil(self.limit));
        let mut plans = plans.into_iter().peekable();
        while plans.peek().is_some() {
            let items: Vec<_> = plans.by_ref().take(self.limit).collect();
            batches.push(Batch::new(batches.len() + 1, items)?);
        }
        Ok(batches)
    }
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self {
            limit: MAX_BATCH_SIZE,
        }
    }
}
