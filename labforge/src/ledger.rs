//! Durable build ledger: what has been created, keyed by lab and node.
//!
//! The ledger is one on-disk JSON document guarded by an exclusive advisory
//! lock on a sidecar lockfile. [`Ledger::open`] blocks until the lock is
//! held and reads the document fresh; [`Ledger::close`] writes it back
//! atomically and releases. There is no fine-grained locking and no caching
//! across accesses; concurrent workers observe each other's writes because
//! every logical access is its own open/modify/close scope. Keep those
//! scopes short (one key update), never held across a network call.
//!
//! Entries are either an instance snapshot ([`LedgerEntry::Server`]) or a
//! small piece of build metadata such as a fetched credential
//! ([`LedgerEntry::Text`]). A crash between two scopes leaves a partially
//! updated but well-formed document; every build step persists
//! independently so the ledger is always good enough for inspection and
//! teardown.

use crate::compute::ServerRecord;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Failure accessing the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger format error: {0}")]
    Format(#[from] serde_json::Error),
    #[error("ledger task failed: {0}")]
    Background(String),
}

/// One recorded fact about a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    /// Instance snapshot as last reported by the provider.
    Server {
        record: ServerRecord,
        recorded_at: DateTime<Utc>,
    },
    /// Build metadata: generated secrets, fetched credential blobs.
    Text {
        value: String,
        recorded_at: DateTime<Utc>,
    },
}

impl LedgerEntry {
    /// Wraps an instance snapshot, stamped now.
    pub fn server(record: ServerRecord) -> Self {
        LedgerEntry::Server {
            record,
            recorded_at: Utc::now(),
        }
    }

    /// Wraps a metadata value, stamped now.
    pub fn text(value: impl Into<String>) -> Self {
        LedgerEntry::Text {
            value: value.into(),
            recorded_at: Utc::now(),
        }
    }

    /// The instance snapshot, if this entry holds one.
    pub fn as_server(&self) -> Option<&ServerRecord> {
        match self {
            LedgerEntry::Server { record, .. } => Some(record),
            LedgerEntry::Text { .. } => None,
        }
    }

    /// The metadata value, if this entry holds one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            LedgerEntry::Text { value, .. } => Some(value),
            LedgerEntry::Server { .. } => None,
        }
    }
}

type Document = BTreeMap<String, BTreeMap<String, LedgerEntry>>;

/// Exclusive handle on the on-disk ledger.
///
/// # Example
///
/// ```ignore
/// use labforge::ledger::{Ledger, LedgerEntry};
///
/// let mut ledger = Ledger::open(&path)?;
/// ledger.set("alpha", "alpha_controller1", LedgerEntry::server(record));
/// ledger.close()?;
/// ```
pub struct Ledger {
    path: PathBuf,
    lockfile: File,
    document: Document,
    dirty: bool,
}

impl Ledger {
    /// Opens the ledger at `path`, blocking until exclusive access is
    /// granted, and reads the current document. A missing file is an empty
    /// ledger.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lockfile = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(lock_path(path))?;
        lockfile.lock_exclusive()?;

        let document = match fs::read(path) {
            Ok(bytes) if bytes.is_empty() => Document::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Document::new(),
            Err(error) => return Err(error.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            lockfile,
            document,
            dirty: false,
        })
    }

    /// Returns the entry for `node` in `lab`, if present.
    pub fn get(&self, lab: &str, node: &str) -> Option<&LedgerEntry> {
        self.document.get(lab)?.get(node)
    }

    /// Inserts or overwrites the entry for `node` in `lab`.
    pub fn set(&mut self, lab: &str, node: &str, entry: LedgerEntry) {
        self.document
            .entry(lab.to_string())
            .or_default()
            .insert(node.to_string(), entry);
        self.dirty = true;
    }

    /// Removes the entry for `node` in `lab`. Returns whether it existed.
    /// An emptied lab key is removed with it.
    pub fn delete(&mut self, lab: &str, node: &str) -> bool {
        let Some(nodes) = self.document.get_mut(lab) else {
            return false;
        };
        let existed = nodes.remove(node).is_some();
        if nodes.is_empty() {
            self.document.remove(lab);
        }
        if existed {
            self.dirty = true;
        }
        existed
    }

    /// Removes a whole lab. Returns whether it existed.
    pub fn delete_lab(&mut self, lab: &str) -> bool {
        let existed = self.document.remove(lab).is_some();
        if existed {
            self.dirty = true;
        }
        existed
    }

    /// All entries recorded for `lab`, keyed by node name.
    pub fn list(&self, lab: &str) -> BTreeMap<String, LedgerEntry> {
        self.document.get(lab).cloned().unwrap_or_default()
    }

    /// Names of all recorded labs.
    pub fn labs(&self) -> Vec<String> {
        self.document.keys().cloned().collect()
    }

    /// The whole document, for inspection commands.
    pub fn document(&self) -> &BTreeMap<String, BTreeMap<String, LedgerEntry>> {
        &self.document
    }

    /// Writes the document back (if modified) and releases the lock.
    pub fn close(mut self) -> Result<(), LedgerError> {
        self.flush()
    }

    fn flush(&mut self) -> Result<(), LedgerError> {
        if !self.dirty {
            return Ok(());
        }
        // Write-then-rename so a crash mid-write never truncates the ledger.
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, serde_json::to_vec_pretty(&self.document)?)?;
        fs::rename(&staging, &self.path)?;
        self.dirty = false;
        Ok(())
    }

    /// Runs one short read-modify-write scope on the ledger at `path`
    /// without blocking the async runtime. The lock is held only for the
    /// duration of `operation`.
    pub async fn update<T, F>(path: &Path, operation: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Ledger) -> T + Send + 'static,
        T: Send + 'static,
    {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<T, LedgerError> {
            let mut ledger = Ledger::open(&path)?;
            let value = operation(&mut ledger);
            ledger.close()?;
            Ok(value)
        })
        .await
        .map_err(|join_error| LedgerError::Background(join_error.to_string()))?
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(error) = self.flush() {
                warn!(path = %self.path.display(), error = %error, "failed to flush ledger on drop");
            }
        }
        if let Err(error) = self.lockfile.unlock() {
            warn!(path = %self.path.display(), error = %error, "failed to release ledger lock");
        }
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

/// Where the ledger lives by default (~/.labforge/ledger.json).
pub fn default_ledger_path() -> PathBuf {
    crate::config::config_directory().join("ledger.json")
}
