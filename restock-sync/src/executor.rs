//! Rate-limited execution of batches against the target system.
//!
//! Batches run one at a time. Transient failures (throttle, 5xx, timeout,
//! network) are retried with exponential backoff; permanent failures fail the
//! batch at once. Either way the run moves on to the next batch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use restock_core::config::RetrySettings;
use restock_core::{AdjustmentPlan, FailureReason, Sku, TargetItemId, ThrottleBudget};

use crate::batch::Batch;
use crate::collaborators::TargetSystem;
use crate::error::TargetError;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_secs(settings.base_delay_secs),
            max_delay: Duration::from_secs(settings.max_delay_secs),
        }
    }

    /// Whether attempt `attempt` (0-based) may be followed by another one.
    pub fn should_retry(&self, attempt: u32, error: &TargetError) -> bool {
        attempt + 1 < self.max_attempts && error.is_transient()
    }

    /// Wait before the retry that follows attempt `attempt`.
    ///
    /// `min(base * 2^attempt, max)`, unless the target sent a `retry_after`
    /// hint, which is used instead (still capped at `max`).
    pub fn delay_for(&self, attempt: u32, error: &TargetError) -> Duration {
        if let Some(hint) = error.retry_after() {
            return hint.min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Per-run call accounting. A fresh value is created for every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionStats {
    /// Target calls made, resolves and bulk adjustments, retries included.
    pub calls: u64,
    pub retries: u64,
    /// Most recent throttle budget the target reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_remaining: Option<ThrottleBudget>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Applied,
    Failed(FailureReason),
    /// Never reached the target because the run was cancelled.
    Skipped,
}

/// Outcome of one batch, item by item in batch order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub index: usize,
    pub outcomes: Vec<(AdjustmentPlan, ItemOutcome)>,
    pub retries_used: u32,
    pub throttle_remaining: Option<ThrottleBudget>,
}

impl BatchResult {
    fn uniform(batch: &Batch, outcome: ItemOutcome, retries_used: u32) -> Self {
        Self {
            index: batch.index,
            outcomes: batch
                .items()
                .iter()
                .map(|plan| (plan.clone(), outcome.clone()))
                .collect(),
            retries_used,
            throttle_remaining: None,
        }
    }

    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Applied))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Skipped))
    }

    /// `true` when no item was applied and at least one failed.
    pub fn is_fully_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.failed() == self.outcomes.len()
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Result of an identifier lookup after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(TargetItemId),
    NotFound,
    Failed(String),
    Cancelled,
}

enum Attempt<T> {
    Succeeded(T),
    Permanent(TargetError),
    Exhausted(TargetError),
    Cancelled,
}

struct Retried<T> {
    attempt: Attempt<T>,
    retries: u32,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Sends calls to the target one at a time under a [`RetryPolicy`].
///
/// Create one per run and read the accounting back with
/// [`RateLimitedExecutor::into_stats`].
pub struct RateLimitedExecutor {
    target: Arc<dyn TargetSystem>,
    policy: RetryPolicy,
    stats: ExecutionStats,
}

impl RateLimitedExecutor {
    pub fn new(target: Arc<dyn TargetSystem>, policy: RetryPolicy) -> Self {
        Self {
            target,
            policy,
            stats: ExecutionStats::default(),
        }
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn into_stats(self) -> ExecutionStats {
        self.stats
    }

    /// Look up the target identifier for `sku`, retrying transient failures.
    pub async fn resolve_item(&mut self, sku: &Sku, cancel: &CancellationToken) -> Resolution {
        let target = Arc::clone(&self.target);
        let retried = self
            .with_retry("resolve_item", cancel, || {
                let target = Arc::clone(&target);
                async move { target.resolve_item(sku).await }
            })
            .await;

        match retried.attempt {
            Attempt::Succeeded(Some(id)) => Resolution::Found(id),
            Attempt::Succeeded(None) => Resolution::NotFound,
            Attempt::Permanent(err) => Resolution::Failed(err.to_string()),
            Attempt::Exhausted(err) => Resolution::Failed(format!(
                "{err} (after {} attempts)",
                retried.retries + 1
            )),
            Attempt::Cancelled => Resolution::Cancelled,
        }
    }

    /// Submit one batch as a single bulk call.
    ///
    /// Never fails as a whole: transport failures are reflected on every item
    /// of the batch, per-item refusals only on the refused items.
    pub async fn execute(&mut self, batch: &Batch, cancel: &CancellationToken) -> BatchResult {
        if cancel.is_cancelled() {
            return BatchResult::uniform(batch, ItemOutcome::Skipped, 0);
        }
        info!(batch = batch.index, items = batch.len(), "submitting batch");

        let target = Arc::clone(&self.target);
        let items = batch.items();
        let retried = self
            .with_retry("bulk_adjust", cancel, || {
                let target = Arc::clone(&target);
                async move { target.bulk_adjust(items).await }
            })
            .await;
        let retries = retried.retries;

        match retried.attempt {
            Attempt::Succeeded(response) => {
                if let Some(budget) = &response.throttle {
                    debug!(
                        batch = batch.index,
                        remaining = budget.remaining,
                        "throttle budget"
                    );
                    self.stats.throttle_remaining = Some(budget.clone());
                }

                let rejected: HashMap<&Sku, &str> = response
                    .rejected
                    .iter()
                    .map(|r| (&r.sku, r.reason.as_str()))
                    .collect();
                let outcomes: Vec<_> = items
                    .iter()
                    .map(|plan| {
                        let outcome = match rejected.get(&plan.sku) {
                            Some(reason) => {
                                warn!(sku = %plan.sku, reason = %reason, "item rejected by target");
                                ItemOutcome::Failed(FailureReason::Rejected(reason.to_string()))
                            }
                            None => ItemOutcome::Applied,
                        };
                        (plan.clone(), outcome)
                    })
                    .collect();
                let unknown = response
                    .rejected
                    .iter()
                    .filter(|r| !items.iter().any(|plan| plan.sku == r.sku))
                    .count();
                if unknown > 0 {
                    warn!(batch = batch.index, unknown, "target rejected SKUs that were not in the batch");
                }

                let result = BatchResult {
                    index: batch.index,
                    outcomes,
                    retries_used: retries,
                    throttle_remaining: response.throttle,
                };
                info!(
                    batch = batch.index,
                    applied = result.applied(),
                    failed = result.failed(),
                    retries,
                    "batch complete"
                );
                result
            }
            Attempt::Permanent(err) => {
                warn!(batch = batch.index, error = %err, "batch rejected by target");
                BatchResult::uniform(
                    batch,
                    ItemOutcome::Failed(FailureReason::BatchRejected(err.to_string())),
                    retries,
                )
            }
            Attempt::Exhausted(err) => {
                warn!(
                    batch = batch.index,
                    attempts = retries + 1,
                    error = %err,
                    "batch failed after exhausting retries"
                );
                BatchResult::uniform(
                    batch,
                    ItemOutcome::Failed(FailureReason::RetriesExhausted(err.to_string())),
                    retries,
                )
            }
            Attempt::Cancelled => {
                info!(batch = batch.index, "batch abandoned during backoff; run cancelled");
                BatchResult::uniform(batch, ItemOutcome::Skipped, retries)
            }
        }
    }

    async fn with_retry<T, F, Fut>(
        &mut self,
        operation: &'static str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Retried<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TargetError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            self.stats.calls += 1;
            let error = match call().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt = attempt + 1, "call succeeded after retries");
                    }
                    return Retried {
                        attempt: Attempt::Succeeded(value),
                        retries: attempt,
                    };
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                return Retried {
                    attempt: Attempt::Permanent(error),
                    retries: attempt,
                };
            }
            if !self.policy.should_retry(attempt, &error) {
                return Retried {
                    attempt: Attempt::Exhausted(error),
                    retries: attempt,
                };
            }

            let delay = self.policy.delay_for(attempt, &error);
            warn!(
                operation,
                attempt = attempt + 1,
                max_attempts = self.policy.max_attempts,
                delay_secs = delay.as_secs_f64(),
                error = %error,
                "transient failure; backing off"
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Retried { attempt: Attempt::Cancelled, retries: attempt };
                }
                _ = tokio::time::sleep(delay) => {}
            }
            self.stats.retries += 1;
            attempt += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
