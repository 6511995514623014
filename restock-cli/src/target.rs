//! HTTP target system speaking a small JSON contract.
//!
//! ```text
//! GET  {base}/items?sku=<sku>          → 200 {"id": "..."} | 404
//! POST {base}/inventory/adjustments    ← {"changes": [{"sku", "item_id", "delta"}]}
//!                                      → 200 {"rejected": [{"sku", "reason"}], "throttle": {...}}
//! ```
//!
//! `ureq` is blocking, so every call runs on `spawn_blocking`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use restock_core::{AdjustmentPlan, Sku, TargetItemId};
use restock_sync::{BulkAdjustResponse, TargetError, TargetSystem};

#[derive(Clone)]
pub struct HttpTarget {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemLookup {
    id: String,
}

#[derive(Debug, Serialize)]
struct AdjustmentRequest {
    changes: Vec<ChangeLine>,
}

#[derive(Debug, Serialize)]
struct ChangeLine {
    sku: String,
    item_id: String,
    delta: i64,
}

impl HttpTarget {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }

    fn resolve_blocking(&self, sku: &Sku) -> Result<Option<TargetItemId>, TargetError> {
        let url = format!("{}/items", self.base_url);
        let request = self.authorize(self.agent.get(&url)).query("sku", &sku.0);
        match request.call() {
            Ok(response) => {
                let lookup: ItemLookup = response
                    .into_json()
                    .map_err(|e| TargetError::InvalidResponse(e.to_string()))?;
                Ok(Some(TargetItemId::from(lookup.id)))
            }
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(err) => Err(map_error(err)),
        }
    }

    fn adjust_blocking(&self, body: AdjustmentRequest) -> Result<BulkAdjustResponse, TargetError> {
        let url = format!("{}/inventory/adjustments", self.base_url);
        let response = self
            .authorize(self.agent.post(&url))
            .send_json(&body)
            .map_err(map_error)?;
        response
            .into_json::<BulkAdjustResponse>()
            .map_err(|e| TargetError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl TargetSystem for HttpTarget {
    async fn resolve_item(&self, sku: &Sku) -> Result<Option<TargetItemId>, TargetError> {
        let target = self.clone();
        let sku = sku.clone();
        tokio::task::spawn_blocking(move || target.resolve_blocking(&sku))
            .await
            .map_err(|e| TargetError::Network(e.to_string()))?
    }

    async fn bulk_adjust(
        &self,
        items: &[AdjustmentPlan],
    ) -> Result<BulkAdjustResponse, TargetError> {
        let body = AdjustmentRequest {
            changes: items
                .iter()
                .map(|plan| ChangeLine {
                    sku: plan.sku.0.clone(),
                    item_id: plan.target_item_id.0.clone(),
                    delta: plan.delta,
                })
                .collect(),
        };
        let target = self.clone();
        tokio::task::spawn_blocking(move || target.adjust_blocking(body))
            .await
            .map_err(|e| TargetError::Network(e.to_string()))?
    }
}

fn map_error(err: ureq::Error) -> TargetError {
    match err {
        ureq::Error::Status(status, response) => {
            let retry_after = response.header("Retry-After").map(str::to_owned);
            let body = response.into_string().unwrap_or_default();
            classify_status(status, retry_after.as_deref(), body)
        }
        ureq::Error::Transport(transport) => classify_transport(&transport),
    }
}

/// Map a non-2xx status to the engine's transient/permanent split.
fn classify_status(status: u16, retry_after: Option<&str>, body: String) -> TargetError {
    match status {
        429 => TargetError::Throttled {
            retry_after: retry_after.and_then(parse_retry_after),
        },
        408 => TargetError::Timeout,
        500..=599 => TargetError::Server {
            status,
            message: body,
        },
        _ => TargetError::Rejected {
            status,
            message: body,
        },
    }
}

/// Delay-seconds form only; HTTP-date values fall back to computed backoff.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn classify_transport(transport: &ureq::Transport) -> TargetError {
    let timed_out = std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .is_some_and(|io| {
            matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        });
    if timed_out {
        TargetError::Timeout
    } else {
        TargetError::Network(transport.to_string())
    }
}
