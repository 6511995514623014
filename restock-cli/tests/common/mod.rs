#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use assert_cmd::Command;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::TempDir;

/// HTTP target on a background runtime: resolves every SKU except
/// `unknown`, accepts every adjustment.
pub struct MockTarget {
    pub url: String,
    state: MockState,
}

#[derive(Clone)]
struct MockState {
    unknown: Arc<Vec<String>>,
    requests: Arc<Mutex<Vec<String>>>,
    lookups: Arc<Mutex<Vec<String>>>,
}

#[derive(Deserialize)]
struct LookupQuery {
    sku: String,
}

impl MockTarget {
    pub fn spawn(unknown: &[&str]) -> Self {
        let state = MockState {
            unknown: Arc::new(unknown.iter().map(|s| s.to_string()).collect()),
            requests: Arc::default(),
            lookups: Arc::default(),
        };
        let app = Router::new()
            .route("/items", get(lookup))
            .route("/inventory/adjustments", post(adjust))
            .with_state(state.clone());

        let (addr_tx, addr_rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("mock runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind mock target");
                addr_tx
                    .send(listener.local_addr().expect("local addr"))
                    .expect("report address");
                axum::serve(listener, app).await.expect("serve mock target");
            });
        });
        let addr = addr_rx.recv().expect("mock target address");
        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Decoded SKUs from identifier lookups, in arrival order.
    pub fn lookups(&self) -> Vec<String> {
        self.state.lookups.lock().unwrap().clone()
    }

    pub fn adjustments(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.starts_with("POST /inventory/adjustments"))
            .collect()
    }
}

async fn lookup(
    State(state): State<MockState>,
    Query(query): Query<LookupQuery>,
) -> (StatusCode, Json<Value>) {
    state
        .requests
        .lock()
        .unwrap()
        .push(format!("GET /items sku={}", query.sku));
    state.lookups.lock().unwrap().push(query.sku.clone());
    if state.unknown.contains(&query.sku) {
        (StatusCode::NOT_FOUND, Json(json!({})))
    } else {
        (
            StatusCode::OK,
            Json(json!({ "id": format!("gid://item/{}", query.sku) })),
        )
    }
}

async fn adjust(State(state): State<MockState>, Json(body): Json<Value>) -> Json<Value> {
    state
        .requests
        .lock()
        .unwrap()
        .push(format!("POST /inventory/adjustments {body}"));
    Json(json!({
        "rejected": [],
        "throttle": { "remaining": 990, "maximum": 1000 }
    }))
}

/// Isolated HOME with an inventory file.
pub struct Workspace {
    pub home: TempDir,
    pub inventory: PathBuf,
}

impl Workspace {
    pub fn new(inventory_json: &str) -> Self {
        let home = TempDir::new().expect("home");
        let inventory = home.path().join("inventory.json");
        std::fs::write(&inventory, inventory_json).expect("write inventory");
        Self { home, inventory }
    }

    pub fn write_inventory(&self, inventory_json: &str) {
        std::fs::write(&self.inventory, inventory_json).expect("write inventory");
    }

    pub fn state_dir(&self) -> PathBuf {
        self.home.path().join(".restock").join("state")
    }

    /// `restock` with HOME pointed at the workspace and no ambient overrides.
    pub fn restock(&self, target: Option<&str>) -> Command {
        let mut cmd = Command::cargo_bin("restock").expect("restock binary");
        cmd.env("HOME", self.home.path())
            .env("USERPROFILE", self.home.path())
            .env("RESTOCK_INVENTORY", &self.inventory)
            .env_remove("RESTOCK_TARGET_URL")
            .env_remove("RESTOCK_LOG")
            .env_remove("RUST_LOG");
        if let Some(url) = target {
            cmd.env("RESTOCK_TARGET_URL", url);
        }
        cmd
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.path().join(".restock").join("config.yaml")
    }

    pub fn write_config(&self, yaml: &str) {
        let path = self.config_path();
        std::fs::create_dir_all(path.parent().unwrap_or(Path::new("."))).expect("config dir");
        std::fs::write(path, yaml).expect("write config");
    }
}

pub fn json_stdout(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}
