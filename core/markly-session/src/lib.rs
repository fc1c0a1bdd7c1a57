//! # markly-session
//!
//! Project session coordination and persistence for the Markly editor.
//!
//! This crate owns the parts of the editor that outlive a single run:
//!
//! - **Config document**: one JSON file per user holding global preferences and
//!   a map of per-project sessions (open tabs, carets, expanded folders).
//! - **Project leases**: one lock file per project root, refreshed by a heartbeat,
//!   so a second instance does not silently reopen a project that is already open.
//! - **Legacy migration**: the old flat single-project config is rewritten once
//!   into the multi-project shape.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. The host event loop drives
//!   timers by calling [`SessionCoordinator::tick`].
//! - **Not thread-safe**: Clients provide their own synchronization (`Mutex`).
//! - **Graceful degradation**: Missing or corrupt files fall back to defaults or
//!   "unlocked", never to a crash.
//! - **Explicit timers**: Debounce and heartbeat deadlines are owned values that
//!   are cancelled deterministically.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use markly_session::{SessionCoordinator, StorageConfig};
//!
//! let storage = StorageConfig::new()?;
//! let _log_guard = markly_session::logging::init(&storage);
//! let mut coordinator = SessionCoordinator::new(storage, shell);
//! coordinator.start();
//! // on every UI change:
//! coordinator.notify_state_changed();
//! // from the event loop:
//! coordinator.tick();
//! // before the window closes:
//! coordinator.shutdown();
//! ```

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lock;
pub mod logging;
pub mod migrate;
pub mod shell;
pub mod storage;
pub mod timer;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigStore, LoadReport};
pub use coordinator::{SessionCoordinator, SessionTiming, StartupOutcome, SwitchOutcome};
pub use error::{Result, SessionError};
pub use lock::{HeartbeatHandle, LockManager, LockRecord, LockTiming};
pub use migrate::{is_legacy, migrate, LegacyDocument};
pub use shell::{EditorShell, RestoredProject, RestoredTab, ShellSnapshot, TabSnapshot};
pub use storage::StorageConfig;
pub use types::{ConfigDocument, ConfigPatch, Preferences, SessionData, Theme};
