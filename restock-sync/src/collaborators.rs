//! Contracts for the external systems the engine talks to.
//!
//! The engine never knows which concrete systems sit behind these traits; the
//! CLI wires file/HTTP implementations and tests wire in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use restock_core::{AdjustmentPlan, InventoryRecord, Sku, TargetItemId, ThrottleBudget};

use crate::error::{SourceError, TargetError};

/// Authoritative inventory listing.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Current in-scope inventory. SKUs must be unique within one listing.
    async fn fetch_inventory(&self) -> Result<Vec<InventoryRecord>, SourceError>;
}

/// Downstream system receiving quantity adjustments.
#[async_trait]
pub trait TargetSystem: Send + Sync {
    /// Look up the target identifier for a SKU. `Ok(None)` means "not found".
    async fn resolve_item(&self, sku: &Sku) -> Result<Option<TargetItemId>, TargetError>;

    /// Apply one bulk adjustment. Items not listed in
    /// [`BulkAdjustResponse::rejected`] are considered applied.
    async fn bulk_adjust(&self, items: &[AdjustmentPlan])
        -> Result<BulkAdjustResponse, TargetError>;
}

/// Transport-level success of a bulk call, with per-item refusals.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BulkAdjustResponse {
    #[serde(default)]
    pub rejected: Vec<ItemRejection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<ThrottleBudget>,
}

/// A single item the target refused for a business reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRejection {
    pub sku: Sku,
    pub reason: String,
}
