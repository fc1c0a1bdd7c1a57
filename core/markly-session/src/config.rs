//! The configuration document on disk (`<data dir>/config.json`).
//!
//! `ConfigStore` is the only code that reads or writes the file.
//!
//! # Writes
//!
//! [`ConfigStore::save`] only buffers: patches accumulate in a pending
//! [`ConfigPatch`] and a debounce deadline (500 ms) is pushed back on every call.
//! The write happens in [`ConfigStore::tick`] once the deadline passes, or right
//! away in [`ConfigStore::flush`].
//!
//! A write is read-merge-write: the file is re-read, pending top-level fields
//! replace the on-disk ones, and pending sessions are merged per project root.
//! Another process that flushed its own project in the meantime keeps its
//! entry. There is no lock around the file itself, so two flushes at the same
//! instant still race on top-level keys (last writer wins).
//!
//! # Reads
//!
//! - Missing or empty file → defaults are written and returned
//! - Corrupt JSON → defaults returned with a reported problem; the file is left
//!   for inspection (and moved aside to `config.json.corrupt` on the next write)
//! - Legacy flat shape → migrated and persisted once

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use fs_err as fs;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Result, SessionError};
use crate::migrate;
use crate::storage::StorageConfig;
use crate::timer::Debounce;
use crate::types::{ConfigDocument, ConfigPatch, Preferences, SessionData};

pub const SAVE_DEBOUNCE_MS: i64 = 500;

/// Result of [`ConfigStore::load`]: always a usable document, plus whatever
/// went wrong getting it.
#[derive(Debug)]
pub struct LoadReport {
    pub document: ConfigDocument,
    pub problem: Option<SessionError>,
}

enum DiskRead {
    Missing,
    Parsed(Value),
    Corrupt(String),
}

pub struct ConfigStore {
    storage: StorageConfig,
    clock: Arc<dyn Clock>,
    document: ConfigDocument,
    pending: ConfigPatch,
    debounce: Debounce,
    writes: u64,
}

impl ConfigStore {
    pub fn new(storage: StorageConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_debounce(storage, clock, SAVE_DEBOUNCE_MS)
    }

    pub fn with_debounce(storage: StorageConfig, clock: Arc<dyn Clock>, debounce_ms: i64) -> Self {
        Self {
            storage,
            clock,
            document: ConfigDocument::default(),
            pending: ConfigPatch::new(),
            debounce: Debounce::new(debounce_ms),
            writes: 0,
        }
    }

    /// Last known merged document (as loaded, plus every successful flush).
    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn preferences(&self) -> &Preferences {
        &self.document.preferences
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Load
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn load(&mut self) -> LoadReport {
        let path = self.storage.config_file();
        let (document, problem) = match read_disk(&path) {
            Ok(DiskRead::Missing) => {
                info!(path = %path.display(), "No config found, writing defaults");
                let document = ConfigDocument::default();
                let problem = self.write_document(&document).err();
                (document, problem)
            }
            Ok(DiskRead::Corrupt(details)) => {
                warn!(
                    path = %path.display(),
                    details = %details,
                    "Config is corrupt, using defaults"
                );
                (
                    ConfigDocument::default(),
                    Some(SessionError::ConfigMalformed {
                        path: path.clone(),
                        details,
                    }),
                )
            }
            Ok(DiskRead::Parsed(raw)) if migrate::is_legacy(&raw) => {
                match migrate::migrate_value(raw) {
                    Ok(document) => {
                        info!(
                            path = %path.display(),
                            sessions = document.sessions.len(),
                            "Migrated legacy single-project config"
                        );
                        let problem = self.write_document(&document).err();
                        (document, problem)
                    }
                    Err(err) => (
                        ConfigDocument::default(),
                        Some(SessionError::ConfigMalformed {
                            path: path.clone(),
                            details: err.to_string(),
                        }),
                    ),
                }
            }
            Ok(DiskRead::Parsed(raw)) => match serde_json::from_value::<ConfigDocument>(raw) {
                Ok(document) => (document, None),
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "Config has wrong shape, using defaults"
                    );
                    (
                        ConfigDocument::default(),
                        Some(SessionError::ConfigMalformed {
                            path: path.clone(),
                            details: err.to_string(),
                        }),
                    )
                }
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Config unreadable, using defaults");
                (ConfigDocument::default(), Some(err))
            }
        };

        self.document = document.clone();
        LoadReport { document, problem }
    }

    /// Session for `root` as currently on disk, falling back to the cached document.
    pub fn session(&self, root: &str) -> Option<SessionData> {
        let fresh = match read_disk(&self.storage.config_file()) {
            Ok(DiskRead::Parsed(raw)) if !migrate::is_legacy(&raw) => {
                serde_json::from_value::<ConfigDocument>(raw).ok()
            }
            _ => None,
        };
        fresh.as_ref().unwrap_or(&self.document).session(root).cloned()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Save / Flush
    // ─────────────────────────────────────────────────────────────────────────────

    /// Buffers `patch` and restarts the debounce countdown.
    pub fn save(&mut self, patch: ConfigPatch) {
        self.pending.merge(patch);
        self.debounce.arm(self.clock.now_ms());
    }

    /// Writes the pending patch if the debounce deadline has passed.
    ///
    /// Returns `Ok(true)` when a write happened.
    pub fn tick(&mut self) -> Result<bool> {
        if !self.debounce.is_due(self.clock.now_ms()) {
            return Ok(false);
        }
        debug!("Config debounce elapsed");
        self.flush()
    }

    /// Cancels the debounce and writes any pending patch now.
    ///
    /// On failure the patch is kept (under anything saved later) for the next
    /// flush; nothing is retried automatically.
    pub fn flush(&mut self) -> Result<bool> {
        self.debounce.cancel();
        if self.pending.is_empty() {
            return Ok(false);
        }

        let patch = std::mem::take(&mut self.pending);
        match self.merge_and_write(&patch) {
            Ok(document) => {
                if let Some(document) = document {
                    self.document = document;
                }
                Ok(true)
            }
            Err(err) => {
                let mut restored = patch;
                restored.merge(std::mem::take(&mut self.pending));
                self.pending = restored;
                Err(err)
            }
        }
    }

    fn merge_and_write(&mut self, patch: &ConfigPatch) -> Result<Option<ConfigDocument>> {
        let path = self.storage.config_file();

        let mut base = match read_disk(&path)? {
            DiskRead::Parsed(Value::Object(map)) => map,
            DiskRead::Parsed(_) | DiskRead::Corrupt(_) => {
                self.set_aside_corrupt(&path);
                default_object()?
            }
            DiskRead::Missing => default_object()?,
        };

        patch.apply_to(&mut base)?;
        let merged = Value::Object(base);
        self.write_value(&merged)?;

        // The file is written either way; a shape we can't type just isn't cached.
        match serde_json::from_value::<ConfigDocument>(merged) {
            Ok(document) => Ok(Some(document)),
            Err(err) => {
                warn!(error = %err, "Merged config does not match the known shape");
                Ok(None)
            }
        }
    }

    /// Renames a damaged config out of the way. An earlier backup is never replaced.
    fn set_aside_corrupt(&self, path: &Path) {
        let mut backup = self.storage.corrupt_config_file();
        if backup.exists() {
            backup = self.storage.corrupt_config_file_at(self.clock.now_ms());
        }
        if backup.exists() {
            warn!(
                path = %path.display(),
                backup = %backup.display(),
                "Backup name taken, overwriting corrupt config in place"
            );
            return;
        }

        match fs::rename(path, &backup) {
            Ok(()) => warn!(
                path = %path.display(),
                backup = %backup.display(),
                "Moved corrupt config aside before overwrite"
            ),
            Err(err) => warn!(
                path = %path.display(),
                error = %err,
                "Failed to move corrupt config aside"
            ),
        }
    }

    fn write_document(&mut self, document: &ConfigDocument) -> Result<()> {
        self.write_value(&document.to_value()?)
    }

    fn write_value(&mut self, value: &Value) -> Result<()> {
        let path = self.storage.config_file();
        let content = serde_json::to_string_pretty(value).map_err(|source| SessionError::Json {
            context: "serialize config".to_string(),
            source,
        })?;

        let wrap = |source: std::io::Error| SessionError::ConfigWriteFailed {
            path: path.clone(),
            source,
        };
        let parent_dir = self.storage.root();
        fs::create_dir_all(parent_dir).map_err(wrap)?;
        let mut temp_file = NamedTempFile::new_in(parent_dir).map_err(wrap)?;
        temp_file.write_all(content.as_bytes()).map_err(wrap)?;
        temp_file.flush().map_err(wrap)?;
        temp_file.persist(&path).map_err(|e| wrap(e.error))?;

        self.writes += 1;
        debug!(path = %path.display(), "Config written");
        Ok(())
    }
}

fn read_disk(path: &Path) -> Result<DiskRead> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(DiskRead::Missing),
        Err(source) => {
            return Err(SessionError::Io {
                context: format!("read {}", path.display()),
                source,
            })
        }
    };

    if content.trim().is_empty() {
        return Ok(DiskRead::Missing);
    }

    Ok(match serde_json::from_str::<Value>(&content) {
        Ok(value) => DiskRead::Parsed(value),
        Err(err) => DiskRead::Corrupt(err.to_string()),
    })
}

fn default_object() -> Result<Map<String, Value>> {
    match ConfigDocument::default().to_value()? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}
