#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use restock_core::{AdjustmentPlan, InventoryRecord, Sku, TargetItemId};
use restock_sync::{
    BulkAdjustResponse, CancellationToken, EngineSettings, InventorySource,
    ReconciliationOrchestrator, SnapshotStore, SourceError, TargetError, TargetSystem,
};

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeSource {
    listing: Mutex<Vec<InventoryRecord>>,
    down: Mutex<bool>,
}

impl FakeSource {
    pub fn set(&self, items: &[(&str, u64)]) {
        *self.listing.lock().unwrap() = records(items);
    }

    pub fn set_records(&self, records: Vec<InventoryRecord>) {
        *self.listing.lock().unwrap() = records;
    }

    pub fn set_down(&self, down: bool) {
        *self.down.lock().unwrap() = down;
    }
}

#[async_trait]
impl InventorySource for FakeSource {
    async fn fetch_inventory(&self) -> Result<Vec<InventoryRecord>, SourceError> {
        if *self.down.lock().unwrap() {
            return Err(SourceError::Unavailable("connection refused".into()));
        }
        Ok(self.listing.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// In-memory target. Bulk calls pop scripted responses first and succeed
/// once the script is empty.
#[derive(Default)]
pub struct FakeTarget {
    pub resolve_calls: AtomicUsize,
    pub bulk_calls: AtomicUsize,
    unknown: Mutex<HashSet<Sku>>,
    script: Mutex<VecDeque<Result<BulkAdjustResponse, TargetError>>>,
    submitted: Mutex<Vec<Vec<AdjustmentPlan>>>,
    gate: Mutex<Option<Arc<Notify>>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl FakeTarget {
    pub fn forget(&self, sku: &str) {
        self.unknown.lock().unwrap().insert(Sku::from(sku));
    }

    pub fn script(&self, responses: Vec<Result<BulkAdjustResponse, TargetError>>) {
        self.script.lock().unwrap().extend(responses);
    }

    /// Block bulk calls until the returned handle is notified.
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    /// Cancel `token` once `calls` bulk calls have completed.
    pub fn cancel_after(&self, calls: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((calls, token));
    }

    pub fn total_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst) + self.bulk_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<Vec<AdjustmentPlan>> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submitted_plan(&self, sku: &str) -> Option<AdjustmentPlan> {
        self.submitted()
            .into_iter()
            .flatten()
            .rev()
            .find(|p| p.sku.0 == sku)
    }
}

#[async_trait]
impl TargetSystem for FakeTarget {
    async fn resolve_item(&self, sku: &Sku) -> Result<Option<TargetItemId>, TargetError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.unknown.lock().unwrap().contains(sku) {
            return Ok(None);
        }
        Ok(Some(TargetItemId::from(format!("gid://item/{sku}"))))
    }

    async fn bulk_adjust(
        &self,
        items: &[AdjustmentPlan],
    ) -> Result<BulkAdjustResponse, TargetError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let calls = self.bulk_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let response = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(BulkAdjustResponse::default()));
        if response.is_ok() {
            self.submitted.lock().unwrap().push(items.to_vec());
        }

        if let Some((after, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if calls >= *after {
                token.cancel();
            }
        }
        response
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub dir: TempDir,
    pub source: Arc<FakeSource>,
    pub target: Arc<FakeTarget>,
    pub orchestrator: Arc<ReconciliationOrchestrator>,
}

impl Harness {
    pub fn store(&self) -> &SnapshotStore {
        self.orchestrator.store()
    }

    pub fn stored_quantity(&self, sku: &str) -> Option<u64> {
        self.store()
            .load()
            .expect("load snapshot")
            .get(&Sku::from(sku))
            .map(|e| e.quantity)
    }
}

pub fn harness() -> Harness {
    harness_with(EngineSettings::default())
}

pub fn harness_with(settings: EngineSettings) -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let source = Arc::new(FakeSource::default());
    let target = Arc::new(FakeTarget::default());
    let orchestrator = ReconciliationOrchestrator::new(
        SnapshotStore::new(dir.path().join("state")),
        Arc::clone(&source) as Arc<dyn InventorySource>,
        Arc::clone(&target) as Arc<dyn TargetSystem>,
        settings,
    )
    .expect("valid settings");
    Harness {
        dir,
        source,
        target,
        orchestrator: Arc::new(orchestrator),
    }
}

pub fn records(items: &[(&str, u64)]) -> Vec<InventoryRecord> {
    items
        .iter()
        .map(|(sku, qty)| InventoryRecord::new(*sku, *qty))
        .collect()
}

pub fn server_error() -> TargetError {
    TargetError::Server {
        status: 502,
        message: "bad gateway".into(),
    }
}
