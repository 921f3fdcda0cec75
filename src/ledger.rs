//! The migration ledger: a JSON journal binding every applied migration to
//! its content hash, timestamp, and batch number.
//!
//! The file is loaded lazily, mutated only while the sibling lock is held,
//! and persisted by writing `<ledger>.tmp` and renaming it into place before
//! the lock is released.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::lock::{self, LockOptions};

pub const DEFAULT_LEDGER_FILE: &str = ".schemact_ledger.json";

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub filename: String,
    /// Lowercase hex SHA-256 of the file bytes as read at apply time.
    pub hash: String,
    pub applied_at: String,
    pub batch: u32,
}

/// The journal contents. `current_batch` always equals the highest batch
/// number present, or zero when nothing has been applied.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerState {
    #[serde(default)]
    pub migrations: Vec<LedgerEntry>,
    #[serde(default)]
    pub current_batch: u32,
}

impl LedgerState {
    pub fn is_recorded(&self, filename: &str) -> bool {
        self.migrations.iter().any(|e| e.filename == filename)
    }

    /// Discovered filenames not yet recorded, in discovery order.
    pub fn pending(&self, discovered: &[String]) -> Vec<String> {
        discovered
            .iter()
            .filter(|name| !self.is_recorded(name))
            .cloned()
            .collect()
    }

    /// Entries of the most recent batch, in reverse append order, ready to
    /// roll back.
    pub fn last_batch_entries(&self) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self
            .migrations
            .iter()
            .filter(|e| e.batch == self.current_batch && self.current_batch > 0)
            .cloned()
            .collect();
        entries.reverse();
        entries
    }

    /// Every recorded migration must still exist on disk with unchanged
    /// content.
    pub fn validate_integrity(&self, files: &HashMap<String, Vec<u8>>) -> Result<()> {
        for entry in &self.migrations {
            let Some(bytes) = files.get(&entry.filename) else {
                return Err(Error::Integrity(format!(
                    "applied migration {} is missing from the migrations directory",
                    entry.filename
                )));
            };
            let actual = compute_hash(bytes);
            if actual != entry.hash {
                return Err(Error::Integrity(format!(
                    "applied migration {} has been modified since it was applied (recorded {}, found {})",
                    entry.filename, entry.hash, actual
                )));
            }
        }
        Ok(())
    }
}

/// Lowercase hex SHA-256 of the given bytes.
pub fn compute_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Handle on the on-disk ledger and its lock.
pub struct Ledger {
    path: PathBuf,
    lock_options: LockOptions,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Ledger {
            path: path.into(),
            lock_options: LockOptions::default(),
        }
    }

    pub fn with_lock_options(path: impl Into<PathBuf>, lock_options: LockOptions) -> Self {
        Ledger {
            path: path.into(),
            lock_options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The sibling lock path, `<ledger>.lock`.
    pub fn lock_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.lock", self.path.display()))
    }

    /// Path used for atomic persistence, `<ledger>.tmp`.
    pub fn temp_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.tmp", self.path.display()))
    }

    /// Read the journal. A missing file is an empty ledger; an unparsable
    /// file is an integrity failure, never repaired automatically.
    pub fn load(&self) -> Result<LedgerState> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LedgerState::default());
            }
            Err(e) => {
                return Err(Error::Integrity(format!(
                    "failed to read ledger {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };
        serde_json::from_str(&content).map_err(|e| {
            Error::Integrity(format!(
                "ledger {} is corrupted: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Record a batch of applied migrations. All entries get the next batch
    /// number and one shared timestamp. An empty batch is a no-op.
    pub fn record_batch(&self, files: &[(String, Vec<u8>)]) -> Result<LedgerState> {
        if files.is_empty() {
            return self.load();
        }
        let guard = lock::acquire(&self.lock_path(), &self.lock_options)?;
        let mut state = self.load()?;
        let batch = state.current_batch + 1;
        let applied_at = Utc::now().to_rfc3339();
        for (filename, bytes) in files {
            state.migrations.push(LedgerEntry {
                filename: filename.clone(),
                hash: compute_hash(bytes),
                applied_at: applied_at.clone(),
                batch,
            });
        }
        state.current_batch = batch;
        self.persist(&state)?;
        guard.release()?;
        Ok(state)
    }

    /// Drop every entry of the most recent batch and step the counter back.
    pub fn rollback_last_batch(&self) -> Result<LedgerState> {
        let guard = lock::acquire(&self.lock_path(), &self.lock_options)?;
        let mut state = self.load()?;
        if state.current_batch == 0 {
            guard.release()?;
            return Ok(state);
        }
        let current = state.current_batch;
        state.migrations.retain(|e| e.batch != current);
        state.current_batch = current - 1;
        self.persist(&state)?;
        guard.release()?;
        Ok(state)
    }

    /// Remove the lock file no matter who owns it. Operator action.
    pub fn force_unlock(&self) -> Result<bool> {
        lock::force_unlock(&self.lock_path())
    }

    fn persist(&self, state: &LedgerState) -> Result<()> {
        let temp = self.temp_path();
        let json = serde_json::to_string_pretty(state).map_err(|e| {
            Error::Integrity(format!("failed to serialize ledger: {}", e))
        })?;
        std::fs::write(&temp, json.as_bytes()).map_err(|e| {
            Error::Integrity(format!(
                "failed to write ledger temp file {}: {}",
                temp.display(),
                e
            ))
        })?;
        std::fs::rename(&temp, &self.path).map_err(|e| {
            Error::Integrity(format!(
                "failed to move ledger into place at {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}
