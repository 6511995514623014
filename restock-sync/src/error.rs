//! Error types for restock-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use restock_core::Sku;

use crate::orchestrator::SyncSummary;

/// Snapshot persistence failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (save path).
    #[error("snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a persisted snapshot was rejected on load. Never surfaced as a run
/// failure: the store logs it and substitutes an empty snapshot.
#[derive(Debug, Error)]
pub enum SnapshotCorruption {
    #[error("malformed snapshot document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("checksum mismatch (stored {stored}, computed {computed})")]
    ChecksumMismatch { stored: String, computed: String },

    #[error("invalid snapshot entry: {0}")]
    InvalidEntry(String),
}

/// Failures reported by the source collaborator.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source system could not be reached or read.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The listing violated the one-record-per-SKU contract.
    #[error("source listing contains duplicate SKU '{0}'")]
    DuplicateSku(Sku),
}

/// Failures reported by the target collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TargetError {
    /// Explicit rate-limit response.
    #[error("throttled by target system")]
    Throttled { retry_after: Option<Duration> },

    /// Server-side 5xx.
    #[error("target server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("target request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    /// Non-retryable refusal of the whole request (4xx other than 429).
    #[error("target rejected request with {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The response could not be understood.
    #[error("invalid target response: {0}")]
    InvalidResponse(String),
}

impl TargetError {
    /// Whether the retry policy applies to this failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TargetError::Throttled { .. }
                | TargetError::Server { .. }
                | TargetError::Timeout
                | TargetError::Network(_)
        )
    }

    /// Server-provided wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TargetError::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// A batch ceiling outside the target system's bulk limit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("batch size {requested} outside allowed range 1..={limit}")]
pub struct BatchLimitError {
    pub requested: usize,
    pub limit: usize,
}

/// Run-level failures surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Another run currently holds the snapshot.
    #[error("a reconciliation run is already in progress")]
    ConcurrentRun,

    /// Nothing was mutated; safe to retry later.
    #[error(transparent)]
    SourceUnavailable(#[from] SourceError),

    /// Snapshot could not be read, or reset failed.
    #[error("snapshot storage error: {0}")]
    Storage(#[from] StorageError),

    /// Target changes were applied but the new snapshot was not written.
    /// The summary describes the applied work.
    #[error("snapshot could not be written after applying changes: {source}")]
    Finalize {
        #[source]
        source: StorageError,
        summary: Box<SyncSummary>,
    },

    #[error(transparent)]
    BatchLimit(#[from] BatchLimitError),

    /// A blocking task panicked or was cancelled by the runtime.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience constructor for [`StorageError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.into(),
        source,
    }
}
