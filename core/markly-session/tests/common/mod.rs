//! Shared fixtures for coordinator integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use markly_session::{
    EditorShell, ManualClock, RestoredProject, SessionCoordinator, SessionTiming, ShellSnapshot,
    StorageConfig, TabSnapshot,
};

pub const START_MS: i64 = 1_700_000_000_000;

/// Records everything the coordinator pushes to the UI.
#[derive(Debug, Default)]
pub struct FakeShell {
    pub snapshot: ShellSnapshot,
    pub caret: Option<usize>,
    pub restored: Vec<RestoredProject>,
    pub warnings: Vec<String>,
    pub blocked: Vec<String>,
}

impl FakeShell {
    pub fn last_restored(&self) -> &RestoredProject {
        self.restored.last().expect("no project was restored")
    }

    /// Replaces the visible tabs with one saved file and focuses it.
    pub fn show_file(&mut self, root: &str, path: &str, caret: usize) {
        self.snapshot = ShellSnapshot {
            project_root: Some(root.to_string()),
            tabs: vec![TabSnapshot {
                id: "tab-1".to_string(),
                path: Some(path.to_string()),
                modified: false,
            }],
            active_tab_id: Some("tab-1".to_string()),
            expanded_folders: Vec::new(),
        };
        self.caret = Some(caret);
    }
}

impl EditorShell for FakeShell {
    fn snapshot(&self) -> ShellSnapshot {
        self.snapshot.clone()
    }

    fn caret_offset(&self) -> Option<usize> {
        self.caret
    }

    fn restore_project(&mut self, project: RestoredProject) {
        self.snapshot = ShellSnapshot {
            project_root: Some(project.root.clone()),
            tabs: project
                .tabs
                .iter()
                .map(|t| TabSnapshot {
                    id: t.id.clone(),
                    path: Some(t.path.clone()),
                    modified: false,
                })
                .collect(),
            active_tab_id: project.active_tab_id.clone(),
            expanded_folders: project.expanded_folders.clone(),
        };
        self.restored.push(project);
    }

    fn report_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    fn report_blocked(&mut self, root: &str) {
        self.blocked.push(root.to_string());
    }
}

pub fn instance(data_dir: &Path, clock: &ManualClock) -> SessionCoordinator<FakeShell> {
    SessionCoordinator::with_timing(
        StorageConfig::with_root(data_dir),
        FakeShell::default(),
        Arc::new(clock.clone()),
        SessionTiming::default(),
    )
}

/// Creates a project folder with the given markdown files.
pub fn project(parent: &Path, name: &str, files: &[&str]) -> PathBuf {
    let root = parent.join(name);
    std::fs::create_dir_all(&root).unwrap();
    for file in files {
        std::fs::write(root.join(file), format!("# {}\n", file)).unwrap();
    }
    root
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn read_config(data_dir: &Path) -> serde_json::Value {
    let content = std::fs::read_to_string(data_dir.join("config.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}
