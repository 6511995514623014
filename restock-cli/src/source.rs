//! File-backed inventory source.
//!
//! Reads a JSON array of records:
//!
//! ```json
//! [{ "sku": "MANT-500", "quantity": 12, "origin": { "name": "Mantel 500" } }]
//! ```

use std::path::PathBuf;

use async_trait::async_trait;

use restock_core::InventoryRecord;
use restock_sync::{InventorySource, SourceError};

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<Vec<InventoryRecord>, SourceError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            SourceError::Unavailable(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let records: Vec<InventoryRecord> = serde_json::from_str(&contents).map_err(|e| {
            SourceError::Unavailable(format!("invalid inventory file {}: {e}", self.path.display()))
        })?;

        // Records without a stable identifier are out of scope.
        let total = records.len();
        let records: Vec<_> = records
            .into_iter()
            .filter(|r| !r.sku.0.trim().is_empty())
            .collect();
        if records.len() < total {
            tracing::debug!(skipped = total - records.len(), "records without SKU ignored");
        }
        Ok(records)
    }
}

#[async_trait]
impl InventorySource for FileSource {
    async fn fetch_inventory(&self) -> Result<Vec<InventoryRecord>, SourceError> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.read())
            .await
            .map_err(|e| SourceError::Unavailable(format!("inventory reader failed: {e}")))?
    }
}
