//! SessionCoordinator - the entry point the editor talks to.
//!
//! Ties the [`ConfigStore`], the [`LockManager`] and the [`EditorShell`] together:
//!
//! ```text
//! startup:   disk → ConfigStore → SessionCoordinator → EditorShell
//! editing:   EditorShell → SessionCoordinator → ConfigStore (debounced) → disk
//! always:    LockManager heartbeat, polled from tick()
//! ```
//!
//! ## Collision policy
//!
//! A project whose lease is live in another instance is never opened here, at
//! startup or on switch. The shell is told via [`EditorShell::report_blocked`]
//! and phrases it as "already open elsewhere".
//!
//! ## Failure policy
//!
//! Persistence failures never interrupt editing. They are logged, surfaced
//! through [`EditorShell::report_warning`], and the in-memory session carries on.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use fs_err as fs;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigStore, SAVE_DEBOUNCE_MS};
use crate::error::Result;
use crate::lock::{
    HeartbeatHandle, LockManager, LockTiming, HEARTBEAT_INTERVAL_MS, STALE_THRESHOLD_MS,
};
use crate::shell::{EditorShell, RestoredProject, RestoredTab, ShellSnapshot};
use crate::storage::{normalize_root, StorageConfig};
use crate::types::{ConfigPatch, Preferences, SessionData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub save_debounce_ms: i64,
    pub heartbeat_interval_ms: i64,
    pub stale_threshold_ms: i64,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            save_debounce_ms: SAVE_DEBOUNCE_MS,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            stale_threshold_ms: STALE_THRESHOLD_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    /// The remembered project was opened and its session pushed to the shell.
    Restored { root: String },
    /// The remembered project is open in another live instance.
    Blocked { root: String },
    /// Nothing to restore; the shell starts with an empty workspace.
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Opened,
    Blocked,
    AlreadyOpen,
}

pub struct SessionCoordinator<S: EditorShell> {
    shell: S,
    store: ConfigStore,
    locks: LockManager,
    project_root: Option<String>,
    heartbeat: Option<HeartbeatHandle>,
    cursor_positions: BTreeMap<String, usize>,
    initialized: bool,
}

impl<S: EditorShell> SessionCoordinator<S> {
    pub fn new(storage: StorageConfig, shell: S) -> Self {
        Self::with_timing(storage, shell, Arc::new(SystemClock), SessionTiming::default())
    }

    pub fn with_timing(
        storage: StorageConfig,
        shell: S,
        clock: Arc<dyn Clock>,
        timing: SessionTiming,
    ) -> Self {
        let store = ConfigStore::with_debounce(
            storage.clone(),
            Arc::clone(&clock),
            timing.save_debounce_ms,
        );
        let locks = LockManager::with_timing(
            storage,
            clock,
            LockTiming {
                heartbeat_interval_ms: timing.heartbeat_interval_ms,
                stale_threshold_ms: timing.stale_threshold_ms,
            },
        );
        Self {
            shell,
            store,
            locks,
            project_root: None,
            heartbeat: None,
            cursor_positions: BTreeMap::new(),
            initialized: false,
        }
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub fn shell_mut(&mut self) -> &mut S {
        &mut self.shell
    }

    pub fn project_root(&self) -> Option<&str> {
        self.project_root.as_deref()
    }

    pub fn cursor_positions(&self) -> &BTreeMap<String, usize> {
        &self.cursor_positions
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Startup
    // ─────────────────────────────────────────────────────────────────────────────

    /// Loads the config and reopens the last project unless another instance has it.
    pub fn start(&mut self) -> StartupOutcome {
        let report = self.store.load();
        if let Some(problem) = &report.problem {
            warn!(error = %problem, "Config load degraded");
            self.shell
                .report_warning(&format!("Settings could not be loaded: {}", problem));
        }

        let document = report.document;
        let remembered = document
            .last_project_root
            .as_deref()
            .map(|root| normalize_root(root).to_string());
        let outcome = match remembered {
            None => StartupOutcome::Empty,
            Some(root) if self.locks.is_locked(&root) => {
                info!(root = %root, "Last project is open in another instance");
                self.shell.report_blocked(&root);
                StartupOutcome::Blocked { root }
            }
            Some(root) if !Path::new(&root).is_dir() => {
                warn!(root = %root, "Last project folder no longer exists");
                self.shell
                    .report_warning(&format!("Project folder not found: {}", root));
                StartupOutcome::Empty
            }
            Some(root) => {
                let session = document.session(&root).cloned();
                self.open_project(&root, session);
                StartupOutcome::Restored { root }
            }
        };

        self.initialized = true;
        outcome
    }

    fn open_project(&mut self, root: &str, session: Option<SessionData>) {
        self.claim(root);
        self.project_root = Some(root.to_string());

        let restored = self.restore(root, session.unwrap_or_default());
        info!(
            root = %root,
            tabs = restored.tabs.len(),
            folders = restored.expanded_folders.len(),
            "Project opened"
        );
        self.shell.restore_project(restored);
    }

    /// Takes the lease and starts refreshing it.
    fn claim(&mut self, root: &str) {
        if let Err(err) = self.locks.acquire(root) {
            warn!(root = %root, error = %err, "Failed to acquire project lease");
            self.shell
                .report_warning(&format!("Could not lock project {}: {}", root, err));
        }
        self.heartbeat = Some(self.locks.start_heartbeat(root));
    }

    fn restore(&mut self, root: &str, session: SessionData) -> RestoredProject {
        // Stable sort: a parent path is a strict prefix, so it always sorts first.
        let mut expanded_folders = session.expanded_folders;
        expanded_folders.sort_by_key(|folder| folder.len());

        let mut tabs = Vec::with_capacity(session.opened_paths.len());
        for path in session.opened_paths {
            match fs::read_to_string(&path) {
                Ok(content) => tabs.push(RestoredTab {
                    id: Ulid::new().to_string(),
                    name: file_name(&path).to_string(),
                    path,
                    content,
                }),
                Err(err) => {
                    warn!(path = %path, error = %err, "Failed to restore file");
                    self.shell
                        .report_warning(&format!("Could not restore file: {}", file_name(&path)));
                }
            }
        }

        let active_tab_id = session
            .active_path
            .as_deref()
            .and_then(|active| tabs.iter().find(|t| t.path == active))
            .or_else(|| tabs.first())
            .map(|t| t.id.clone());

        self.cursor_positions = session.cursor_positions;

        RestoredProject {
            root: root.to_string(),
            expanded_folders,
            tabs,
            active_tab_id,
            cursor_positions: self.cursor_positions.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Ongoing Persistence
    // ─────────────────────────────────────────────────────────────────────────────

    /// Called by the shell on every observable change. Ignored before `start`.
    pub fn notify_state_changed(&mut self) {
        if !self.initialized {
            return;
        }
        self.queue_session();
    }

    /// Snapshots the session and writes everything pending now.
    pub fn flush(&mut self) -> Result<()> {
        if self.initialized {
            self.queue_session();
        }
        self.store.flush().map(|_| ())
    }

    /// Synchronously persists the outgoing project's session.
    pub fn save_current_session(&mut self) -> Result<()> {
        self.flush()
    }

    /// Drives the debounce write and the lease heartbeat. Call from the event loop.
    pub fn tick(&mut self) {
        if let Err(err) = self.store.tick() {
            warn!(error = %err, "Deferred config write failed");
            self.shell
                .report_warning(&format!("Settings could not be saved: {}", err));
        }
        if let Some(heartbeat) = self.heartbeat.as_mut() {
            self.locks.refresh_if_due(heartbeat);
        }
    }

    fn queue_session(&mut self) {
        let snapshot = self.shell.snapshot();
        self.capture_cursor(&snapshot);

        let Some(root) = self.project_root.clone() else {
            return;
        };
        if let Some(shell_root) = snapshot.project_root.as_deref() {
            if normalize_root(shell_root) != normalize_root(&root) {
                debug!(
                    shell_root = %shell_root,
                    root = %root,
                    "Shell reports a different root; persisting under the leased one"
                );
            }
        }

        let session = self.session_from(&snapshot);
        self.store.save(
            ConfigPatch::new()
                .with_last_project_root(Some(&root))
                .with_session(&root, session),
        );
    }

    /// Stores the focused caret under the active tab's path (or id when untitled).
    fn capture_cursor(&mut self, snapshot: &ShellSnapshot) {
        let Some(active_id) = snapshot.active_tab_id.as_deref() else {
            return;
        };
        let Some(offset) = self.shell.caret_offset() else {
            return;
        };
        let key = snapshot
            .active_tab()
            .and_then(|t| t.path.clone())
            .unwrap_or_else(|| active_id.to_string());
        self.cursor_positions.insert(key, offset);
    }

    fn session_from(&self, snapshot: &ShellSnapshot) -> SessionData {
        SessionData {
            opened_paths: snapshot
                .tabs
                .iter()
                .filter_map(|t| t.path.clone())
                .collect(),
            active_path: snapshot.active_tab().and_then(|t| t.path.clone()),
            expanded_folders: snapshot.expanded_folders.clone(),
            cursor_positions: self.cursor_positions.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Project Switch / Exit
    // ─────────────────────────────────────────────────────────────────────────────

    /// Hands the current project over and opens `new_root`.
    ///
    /// When `new_root` is held elsewhere the current project stays open and its
    /// lease is taken back.
    pub fn switch_project(&mut self, new_root: &str) -> SwitchOutcome {
        let new_root = normalize_root(new_root);
        if self.project_root.as_deref() == Some(new_root) {
            return SwitchOutcome::AlreadyOpen;
        }

        if let Err(err) = self.save_current_session() {
            warn!(error = %err, "Failed to save session before switching");
            self.shell
                .report_warning(&format!("Session could not be saved: {}", err));
        }

        let previous = self.project_root.clone();
        if let Some(heartbeat) = self.heartbeat.take() {
            self.locks.release_held(heartbeat);
        }

        if self.locks.is_locked(new_root) {
            info!(root = %new_root, "Switch refused, project is open in another instance");
            self.shell.report_blocked(new_root);
            if let Some(previous) = previous {
                self.claim(&previous);
            }
            return SwitchOutcome::Blocked;
        }

        let session = self.store.session(new_root);
        self.open_project(new_root, session);
        self.initialized = true;
        SwitchOutcome::Opened
    }

    /// Flushes and releases the lease. Never fails; hands the shell back.
    pub fn shutdown(mut self) -> S {
        if let Err(err) = self.flush() {
            warn!(error = %err, "Final config flush failed");
            self.shell
                .report_warning(&format!("Settings could not be saved: {}", err));
        }
        if let Some(heartbeat) = self.heartbeat.take() {
            self.locks.release_held(heartbeat);
        }
        info!("Session coordinator shut down");
        self.shell
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Global Preferences
    // ─────────────────────────────────────────────────────────────────────────────

    /// Preferences as of the last load or flush.
    pub fn preferences(&self) -> &Preferences {
        self.store.preferences()
    }

    /// Queues a preference change through the same debounced write.
    pub fn save_preferences(&mut self, patch: ConfigPatch) {
        self.store.save(patch);
    }
}

/// Final path component, accepting both separators; "Untitled" when there is none.
fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("Untitled")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_handles_both_separators() {
        assert_eq!(file_name("/proj/a.md"), "a.md");
        assert_eq!(file_name(r"D:\Data\readme.md"), "readme.md");
        assert_eq!(file_name("/proj/"), "Untitled");
    }

    #[test]
    fn test_default_timing() {
        let timing = SessionTiming::default();
        assert_eq!(timing.save_debounce_ms, 500);
        assert_eq!(timing.heartbeat_interval_ms, 10_000);
        assert_eq!(timing.stale_threshold_ms, 30_000);
    }
}
