//! Storage configuration and path management.
//!
//! `StorageConfig` is the single place that decides where the config document,
//! lock files and logs live. Tests inject a temp directory via
//! [`StorageConfig::with_root`].
//!
//! ## Layout
//!
//! ```text
//! <data dir>/markly/
//! ├── config.json                  # ConfigDocument
//! ├── locks/
//! │   └── %2Fhome%2Fme%2Fnotes.lock  # {"timestamp": 1718000000000}
//! └── logs/
//!     └── markly.log.YYYY-MM-DD
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{Result, SessionError};

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "MARKLY_DATA_DIR";

const APP_DIR_NAME: &str = "markly";
const LOCK_SUFFIX: &str = ".lock";

/// Central configuration for all on-disk paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the per-user application data directory.
    ///
    /// Order: `MARKLY_DATA_DIR`, then `<data_dir>/markly`, then `~/.markly`.
    pub fn new() -> Result<Self> {
        resolve_root(std::env::var_os(DATA_DIR_ENV))
            .map(|root| Self { root })
            .ok_or(SessionError::DataDirNotFound)
    }

    /// Creates a StorageConfig with a custom root directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files and Directories
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to config.json (preferences + per-project sessions).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Where a config document that failed to parse is moved before overwrite.
    pub fn corrupt_config_file(&self) -> PathBuf {
        self.root.join("config.json.corrupt")
    }

    /// Backup name used when `config.json.corrupt` is already taken.
    pub fn corrupt_config_file_at(&self, timestamp_ms: i64) -> PathBuf {
        self.root.join(format!("config.json.corrupt.{}", timestamp_ms))
    }

    /// Path to locks/ directory (one lease file per project root).
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    /// Path to logs/ directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Path to the lease file for a project root (without checking if it exists).
    pub fn lock_file(&self, project_root: &str) -> PathBuf {
        self.locks_dir().join(encode_lock_name(project_root))
    }
}

fn resolve_root(env_override: Option<OsString>) -> Option<PathBuf> {
    if let Some(dir) = env_override.filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .or_else(|| dirs::home_dir().map(|h| h.join(format!(".{}", APP_DIR_NAME))))
}

// ─────────────────────────────────────────────────────────────────────────────
// Lock Name Encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Strips trailing separators except for a bare root ("/" or "\").
pub fn normalize_root(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() && !path.is_empty() {
        &path[..1]
    } else {
        trimmed
    }
}

/// Encodes a project root into a filesystem-safe lock file name.
///
/// Percent-encoding keeps the name reversible, unlike a hash.
/// Example: `/Users/me/notes` -> `%2FUsers%2Fme%2Fnotes.lock`
pub fn encode_lock_name(project_root: &str) -> String {
    format!(
        "{}{}",
        urlencoding::encode(normalize_root(project_root)),
        LOCK_SUFFIX
    )
}

/// Reverses [`encode_lock_name`]. Returns `None` for foreign file names.
pub fn decode_lock_name(file_name: &str) -> Option<String> {
    let encoded = file_name.strip_suffix(LOCK_SUFFIX)?;
    urlencoding::decode(encoded).ok().map(|s| s.into_owned())
}
