//! Snapshot store: durable record of the last synchronized state.
//!
//! Persists a JSON document at `<state_dir>/snapshot.json`:
//!
//! ```text
//! { "taken_at": "…", "checksum": "<sha256 hex>",
//!   "entries": { "<sku>": { "quantity": 5, "target_item_id": "…", "synced_at": "…" } } }
//! ```
//!
//! Writes use the `.tmp` + rename pattern. Before the rename, the live
//! document is copied into a bounded history:
//!   snapshot.json → snapshot.json.1 → snapshot.json.2 → snapshot.json.3
//!
//! A document that fails to parse or validate is treated as absent: the
//! caller gets an empty snapshot and the next run resyncs everything.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use restock_core::{Sku, Snapshot, SnapshotEntry, TargetItemId};

use crate::error::{io_err, SnapshotCorruption, StorageError};

pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// Number of prior versions kept next to the live document.
pub const MAX_BACKUPS: usize = 3;

/// On-disk snapshot payload.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    taken_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    entries: BTreeMap<Sku, StoredEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    quantity: u64,
    target_item_id: TargetItemId,
    synced_at: DateTime<Utc>,
}

impl From<&Snapshot> for SnapshotFile {
    fn from(snapshot: &Snapshot) -> Self {
        let entries: BTreeMap<Sku, StoredEntry> = snapshot
            .entries
            .values()
            .map(|e| {
                (
                    e.sku.clone(),
                    StoredEntry {
                        quantity: e.quantity,
                        target_item_id: e.target_item_id.clone(),
                        synced_at: e.synced_at,
                    },
                )
            })
            .collect();
        Self {
            taken_at: snapshot.taken_at,
            checksum: Some(checksum(&entries)),
            entries,
        }
    }
}

impl SnapshotFile {
    fn into_snapshot(self) -> Result<Snapshot, SnapshotCorruption> {
        if let Some(stored) = &self.checksum {
            let computed = checksum(&self.entries);
            if *stored != computed {
                return Err(SnapshotCorruption::ChecksumMismatch {
                    stored: stored.clone(),
                    computed,
                });
            }
        }
        let mut entries = Vec::with_capacity(self.entries.len());
        for (sku, stored) in self.entries {
            if sku.0.trim().is_empty() {
                return Err(SnapshotCorruption::InvalidEntry("empty SKU key".to_string()));
            }
            if stored.target_item_id.0.trim().is_empty() {
                return Err(SnapshotCorruption::InvalidEntry(format!(
                    "SKU '{sku}' has an empty target_item_id"
                )));
            }
            entries.push(SnapshotEntry {
                sku,
                quantity: stored.quantity,
                target_item_id: stored.target_item_id,
                synced_at: stored.synced_at,
            });
        }
        Ok(Snapshot::from_entries(self.taken_at, entries))
    }
}

/// SHA-256 over `sku\tquantity\ttarget_item_id\n` lines in key order.
fn checksum(entries: &BTreeMap<Sku, StoredEntry>) -> String {
    let mut h = Sha256::new();
    for (sku, entry) in entries {
        h.update(sku.0.as_bytes());
        h.update(b"\t");
        h.update(entry.quantity.to_string().as_bytes());
        h.update(b"\t");
        h.update(entry.target_item_id.0.as_bytes());
        h.update(b"\n");
    }
    hex::encode(h.finalize())
}

enum ReadOutcome {
    Missing,
    Loaded(Snapshot),
    Corrupted(SnapshotCorruption),
}

/// Summary of the persisted snapshot, for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub corrupted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corruption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<DateTime<Utc>>,
    pub entries: usize,
    pub file_size_bytes: u64,
    pub backups: usize,
}

/// File-backed snapshot persistence rooted at a state directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<state_dir>/snapshot.json`
    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// `<state_dir>/snapshot.json.<n>`: `1` is the most recent prior version.
    pub fn backup_path(&self, n: usize) -> PathBuf {
        self.dir.join(format!("{SNAPSHOT_FILE}.{n}"))
    }

    fn tmp_path(&self) -> PathBuf {
        self.dir.join(format!("{SNAPSHOT_FILE}.tmp"))
    }

    /// Load the last persisted snapshot.
    ///
    /// Returns an empty snapshot if the file does not exist or fails
    /// validation; only unexpected I/O failures are errors.
    pub fn load(&self) -> Result<Snapshot, StorageError> {
        match self.read()? {
            ReadOutcome::Loaded(snapshot) => {
                tracing::info!(
                    entries = snapshot.len(),
                    taken_at = %snapshot.taken_at,
                    "snapshot loaded"
                );
                Ok(snapshot)
            }
            ReadOutcome::Missing => {
                tracing::info!(path = %self.path().display(), "no snapshot found; first run");
                Ok(Snapshot::empty())
            }
            ReadOutcome::Corrupted(reason) => {
                tracing::warn!(
                    path = %self.path().display(),
                    error = %reason,
                    "snapshot corrupted; falling back to full resync"
                );
                Ok(Snapshot::empty())
            }
        }
    }

    fn read(&self) -> Result<ReadOutcome, StorageError> {
        let path = self.path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(ReadOutcome::Missing),
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                return Ok(ReadOutcome::Corrupted(SnapshotCorruption::InvalidEntry(
                    "document is not valid UTF-8".to_string(),
                )))
            }
            Err(err) => return Err(io_err(&path, err)),
        };
        let parsed = match serde_json::from_str::<SnapshotFile>(&contents) {
            Ok(file) => file.into_snapshot(),
            Err(err) => Err(SnapshotCorruption::from(err)),
        };
        Ok(match parsed {
            Ok(snapshot) => ReadOutcome::Loaded(snapshot),
            Err(reason) => ReadOutcome::Corrupted(reason),
        })
    }

    /// Save `snapshot` atomically, rotating the previous document into history.
    ///
    /// Writes to `snapshot.json.tmp` (mode `0600`), rotates, then renames.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        self.ensure_dir()?;

        let json = serde_json::to_string_pretty(&SnapshotFile::from(snapshot))?;
        let tmp = self.tmp_path();
        fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(err) = set_file_permissions(&tmp) {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }

        if let Err(err) = self.rotate_backups() {
            tracing::warn!(error = %err, "snapshot history rotation failed");
        }

        let path = self.path();
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(path, e));
        }
        tracing::info!(entries = snapshot.len(), path = %path.display(), "snapshot saved");
        Ok(())
    }

    /// Delete the live snapshot so the next run treats every record as new.
    ///
    /// The deleted document is kept as the newest backup. Returns `true` if a
    /// snapshot existed.
    pub fn reset(&self) -> Result<bool, StorageError> {
        let path = self.path();
        if !path.exists() {
            return Ok(false);
        }
        self.rotate_backups()?;
        fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        tracing::info!(path = %path.display(), "snapshot reset; next run resyncs everything");
        Ok(true)
    }

    /// Inspect the persisted snapshot without logging a fallback.
    pub fn info(&self) -> Result<SnapshotInfo, StorageError> {
        let path = self.path();
        let backups = (1..=MAX_BACKUPS)
            .filter(|n| self.backup_path(*n).exists())
            .count();
        let file_size_bytes = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == ErrorKind::NotFound => 0,
            Err(err) => return Err(io_err(&path, err)),
        };

        let mut info = SnapshotInfo {
            path,
            exists: false,
            corrupted: false,
            corruption: None,
            taken_at: None,
            entries: 0,
            file_size_bytes,
            backups,
        };
        match self.read()? {
            ReadOutcome::Missing => {}
            ReadOutcome::Loaded(snapshot) => {
                info.exists = true;
                info.taken_at = Some(snapshot.taken_at);
                info.entries = snapshot.len();
            }
            ReadOutcome::Corrupted(reason) => {
                info.exists = true;
                info.corrupted = true;
                info.corruption = Some(reason.to_string());
            }
        }
        Ok(info)
    }

    /// Shift `.1 → .2 → .3` (dropping the oldest) and copy the live document
    /// into `.1`. The live document stays in place.
    fn rotate_backups(&self) -> Result<bool, StorageError> {
        let live = self.path();
        if !live.exists() {
            return Ok(false);
        }

        let oldest = self.backup_path(MAX_BACKUPS);
        if oldest.exists() {
            fs::remove_file(&oldest).map_err(|e| io_err(&oldest, e))?;
        }
        for n in (1..MAX_BACKUPS).rev() {
            let src = self.backup_path(n);
            let dst = self.backup_path(n + 1);
            if src.exists() {
                fs::rename(&src, &dst).map_err(|e| io_err(&src, e))?;
            }
        }

        let newest = self.backup_path(1);
        fs::copy(&live, &newest).map_err(|e| io_err(&newest, e))?;
        set_file_permissions(&newest)?;
        Ok(true)
    }

    fn ensure_dir(&self) -> Result<(), StorageError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
            set_dir_permissions(&self.dir)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
