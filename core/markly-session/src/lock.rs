//! Lease files that keep two instances off the same project.
//!
//! # Lock File Structure
//!
//! Location: `<data dir>/locks/{encoded root}.lock`, where the encoding is a
//! reversible percent-encoding of the project root (see [`crate::storage`]).
//! The project's identity is the file name; the content is liveness only:
//!
//! ```json
//! { "timestamp": 1718000000000 }
//! ```
//!
//! # Liveness
//!
//! A record is live iff `now - timestamp < stale_threshold` (30 s by default). The
//! owner refreshes it every heartbeat (10 s by default), so a crashed instance's
//! lease dies on its own and nobody ever has to clean it up.
//!
//! Unreadable or unparsable records fail open: they count as "nobody holds it".
//!
//! # Races
//!
//! [`LockManager::acquire`] is a plain write, not a compare-and-swap. Two
//! instances that both see `is_locked == false` before either writes will both
//! believe they own the project.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use fs_err as fs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Result, SessionError};
use crate::storage::StorageConfig;
use crate::timer::Interval;

pub const HEARTBEAT_INTERVAL_MS: i64 = 10_000;
pub const STALE_THRESHOLD_MS: i64 = 30_000;

/// On-disk lease content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Last time the owner proved liveness (epoch ms).
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTiming {
    pub heartbeat_interval_ms: i64,
    pub stale_threshold_ms: i64,
}

impl Default for LockTiming {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            stale_threshold_ms: STALE_THRESHOLD_MS,
        }
    }
}

/// A running heartbeat for one project root.
///
/// Owned by whoever started it. Consuming it (`cancel` or
/// [`LockManager::release_held`]) is the only way to stop it, so a cancelled
/// heartbeat cannot refresh a lease afterwards.
#[derive(Debug)]
#[must_use = "a heartbeat only refreshes the lease while its handle is polled"]
pub struct HeartbeatHandle {
    root: String,
    interval: Interval,
}

impl HeartbeatHandle {
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn cancel(self) {
        debug!(root = %self.root, "Heartbeat cancelled");
    }
}

pub struct LockManager {
    storage: StorageConfig,
    clock: Arc<dyn Clock>,
    timing: LockTiming,
}

impl LockManager {
    pub fn new(storage: StorageConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_timing(storage, clock, LockTiming::default())
    }

    pub fn with_timing(storage: StorageConfig, clock: Arc<dyn Clock>, timing: LockTiming) -> Self {
        Self {
            storage,
            clock,
            timing,
        }
    }

    /// Returns true if a live instance holds the lease for `project_root`.
    pub fn is_locked(&self, project_root: &str) -> bool {
        match self.lock_age_ms(project_root) {
            Some(age) => age < self.timing.stale_threshold_ms,
            None => false,
        }
    }

    /// Age of a readable lease record, `None` when absent or corrupt.
    pub fn lock_age_ms(&self, project_root: &str) -> Option<i64> {
        let record = read_record(&self.storage.lock_file(project_root))?;
        Some(self.clock.now_ms().saturating_sub(record.timestamp))
    }

    /// Claims (or refreshes) the lease. Does not check [`Self::is_locked`] first.
    pub fn acquire(&self, project_root: &str) -> Result<()> {
        let locks_dir = self.storage.locks_dir();
        fs::create_dir_all(&locks_dir).map_err(|source| SessionError::LockWriteFailed {
            path: locks_dir.clone(),
            source,
        })?;

        let path = self.storage.lock_file(project_root);
        let record = LockRecord {
            timestamp: self.clock.now_ms(),
        };
        write_record(&locks_dir, &path, &record)
    }

    /// Starts a heartbeat. The first refresh is due one interval from now.
    pub fn start_heartbeat(&self, project_root: &str) -> HeartbeatHandle {
        debug!(root = %project_root, "Heartbeat started");
        HeartbeatHandle {
            root: project_root.to_string(),
            interval: Interval::starting_at(self.clock.now_ms(), self.timing.heartbeat_interval_ms),
        }
    }

    /// Heartbeat tick: refreshes the lease if the handle is due.
    ///
    /// Returns true when a refresh was written. Failures are logged and otherwise
    /// ignored; the lease then decays to stale on its own.
    pub fn refresh_if_due(&self, handle: &mut HeartbeatHandle) -> bool {
        let now = self.clock.now_ms();
        if !handle.interval.is_due(now) {
            return false;
        }
        handle.interval.reschedule(now);

        match self.acquire(&handle.root) {
            Ok(()) => {
                debug!(root = %handle.root, "Lease refreshed");
                true
            }
            Err(err) => {
                warn!(root = %handle.root, error = %err, "Heartbeat failed to refresh lease");
                false
            }
        }
    }

    /// Deletes the lease file. Never fails: a leftover file goes stale by itself.
    pub fn release(&self, project_root: &str) {
        let path = self.storage.lock_file(project_root);
        match fs::remove_file(&path) {
            Ok(()) => info!(root = %project_root, "Lease released"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(root = %project_root, error = %err, "Failed to remove lease file");
            }
        }
    }

    /// Cancels the heartbeat and releases its lease.
    pub fn release_held(&self, handle: HeartbeatHandle) {
        let root = handle.root.clone();
        handle.cancel();
        self.release(&root);
    }
}

fn read_record(path: &Path) -> Option<LockRecord> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<LockRecord>(&content) {
        Ok(record) => Some(record),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "Ignoring unparsable lease");
            None
        }
    }
}

fn write_record(dir: &Path, path: &Path, record: &LockRecord) -> Result<()> {
    let content = serde_json::to_string(record).map_err(|source| SessionError::Json {
        context: "serialize lock record".to_string(),
        source,
    })?;

    let wrap = |source: std::io::Error| SessionError::LockWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let mut temp_file = NamedTempFile::new_in(dir).map_err(wrap)?;
    temp_file.write_all(content.as_bytes()).map_err(wrap)?;
    temp_file.flush().map_err(wrap)?;
    temp_file.persist(path).map_err(|e| wrap(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tempfile::tempdir;

    const NOW: i64 = 1_700_000_000_000;

    fn manager(root: &Path, clock: &ManualClock) -> LockManager {
        LockManager::new(StorageConfig::with_root(root), Arc::new(clock.clone()))
    }

    fn write_raw(root: &Path, project: &str, content: &str) {
        let storage = StorageConfig::with_root(root);
        std::fs::create_dir_all(storage.locks_dir()).unwrap();
        std::fs::write(storage.lock_file(project), content).unwrap();
    }

    #[test]
    fn test_no_lock_file_means_unlocked() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        assert!(!manager(temp.path(), &clock).is_locked("/proj"));
    }

    #[test]
    fn test_acquire_then_is_locked() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let locks = manager(temp.path(), &clock);
        locks.acquire("/proj").unwrap();
        assert!(locks.is_locked("/proj"));
        assert!(!locks.is_locked("/other"));
    }

    #[test]
    fn test_lock_content_is_timestamp_only() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        manager(temp.path(), &clock).acquire("/proj").unwrap();
        let content =
            std::fs::read_to_string(StorageConfig::with_root(temp.path()).lock_file("/proj"))
                .unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value, serde_json::json!({ "timestamp": NOW }));
    }

    #[test]
    fn test_staleness_boundary() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let locks = manager(temp.path(), &clock);

        write_raw(
            temp.path(),
            "/fresh",
            &format!(r#"{{"timestamp": {}}}"#, NOW - (STALE_THRESHOLD_MS - 1)),
        );
        write_raw(
            temp.path(),
            "/stale",
            &format!(r#"{{"timestamp": {}}}"#, NOW - (STALE_THRESHOLD_MS + 1)),
        );
        write_raw(
            temp.path(),
            "/exact",
            &format!(r#"{{"timestamp": {}}}"#, NOW - STALE_THRESHOLD_MS),
        );

        assert!(locks.is_locked("/fresh"));
        assert!(!locks.is_locked("/stale"));
        assert!(!locks.is_locked("/exact"));
    }

    #[test]
    fn test_corrupt_lock_fails_open() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        write_raw(temp.path(), "/proj", "{not json");
        let locks = manager(temp.path(), &clock);
        assert!(!locks.is_locked("/proj"));
        assert_eq!(locks.lock_age_ms("/proj"), None);
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        write_raw(
            temp.path(),
            "/proj",
            &format!(r#"{{"timestamp": {}, "pid": 42}}"#, NOW - 5),
        );
        let locks = manager(temp.path(), &clock);
        assert!(locks.is_locked("/proj"));
        assert_eq!(locks.lock_age_ms("/proj"), Some(5));
    }

    #[test]
    fn test_release_removes_file_and_tolerates_absence() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let locks = manager(temp.path(), &clock);
        locks.acquire("/proj").unwrap();
        locks.release("/proj");
        assert!(!locks.is_locked("/proj"));
        assert!(!StorageConfig::with_root(temp.path())
            .lock_file("/proj")
            .exists());
        locks.release("/proj");
    }

    #[test]
    fn test_heartbeat_refreshes_timestamp() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let locks = manager(temp.path(), &clock);
        locks.acquire("/proj").unwrap();
        let mut heartbeat = locks.start_heartbeat("/proj");

        clock.advance(HEARTBEAT_INTERVAL_MS - 1);
        assert!(!locks.refresh_if_due(&mut heartbeat));
        assert_eq!(locks.lock_age_ms("/proj"), Some(HEARTBEAT_INTERVAL_MS - 1));

        clock.advance(1);
        assert!(locks.refresh_if_due(&mut heartbeat));
        assert_eq!(locks.lock_age_ms("/proj"), Some(0));
    }

    #[test]
    fn test_heartbeat_keeps_lease_alive_past_threshold() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let locks = manager(temp.path(), &clock);
        locks.acquire("/proj").unwrap();
        let mut heartbeat = locks.start_heartbeat("/proj");

        for _ in 0..10 {
            clock.advance(HEARTBEAT_INTERVAL_MS);
            locks.refresh_if_due(&mut heartbeat);
        }
        assert!(locks.is_locked("/proj"));
    }

    #[test]
    fn test_cancelled_heartbeat_lets_lease_decay() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let locks = manager(temp.path(), &clock);
        locks.acquire("/proj").unwrap();
        locks.start_heartbeat("/proj").cancel();

        clock.advance(STALE_THRESHOLD_MS);
        assert!(!locks.is_locked("/proj"));
    }

    #[test]
    fn test_release_held_removes_lease() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let locks = manager(temp.path(), &clock);
        locks.acquire("/proj").unwrap();
        let heartbeat = locks.start_heartbeat("/proj");
        locks.release_held(heartbeat);
        assert!(!locks.is_locked("/proj"));
    }

    #[test]
    fn test_two_instances_share_lock_dir() {
        let temp = tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let a = manager(temp.path(), &clock);
        let b = manager(temp.path(), &clock);
        a.acquire("/proj").unwrap();
        clock.advance(STALE_THRESHOLD_MS - 1);
        assert!(b.is_locked("/proj"));
    }

    #[test]
    fn test_acquire_fails_when_locks_dir_is_a_file() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("locks"), "").unwrap();
        let clock = ManualClock::new(NOW);
        let err = manager(temp.path(), &clock).acquire("/proj").unwrap_err();
        assert!(matches!(err, SessionError::LockWriteFailed { .. }));
    }
}
