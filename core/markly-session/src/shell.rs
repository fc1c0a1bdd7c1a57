//! The boundary to the UI ("editor shell").
//!
//! The coordinator never holds live references into the UI. It pulls plain
//! snapshots through [`EditorShell::snapshot`] and pushes restored state back
//! through [`EditorShell::restore_project`].

use std::collections::BTreeMap;

/// One open tab as the UI sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabSnapshot {
    pub id: String,
    /// `None` for untitled documents that were never saved.
    pub path: Option<String>,
    pub modified: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellSnapshot {
    pub project_root: Option<String>,
    pub tabs: Vec<TabSnapshot>,
    pub active_tab_id: Option<String>,
    pub expanded_folders: Vec<String>,
}

impl ShellSnapshot {
    pub fn active_tab(&self) -> Option<&TabSnapshot> {
        let id = self.active_tab_id.as_deref()?;
        self.tabs.iter().find(|t| t.id == id)
    }
}

/// A file reopened from a saved session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredTab {
    pub id: String,
    pub path: String,
    pub name: String,
    pub content: String,
}

/// Everything the UI needs to repopulate a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoredProject {
    pub root: String,
    /// Parent folders come before their children.
    pub expanded_folders: Vec<String>,
    /// Empty when nothing could be restored; the UI opens a blank tab itself.
    pub tabs: Vec<RestoredTab>,
    pub active_tab_id: Option<String>,
    pub cursor_positions: BTreeMap<String, usize>,
}

pub trait EditorShell {
    fn snapshot(&self) -> ShellSnapshot;

    /// Caret offset of the focused editor, if one is focused.
    fn caret_offset(&self) -> Option<usize>;

    fn restore_project(&mut self, project: RestoredProject);

    /// Non-fatal notice, e.g. a file that could not be reopened.
    fn report_warning(&mut self, message: &str);

    /// The requested project is held by another live instance.
    fn report_blocked(&mut self, root: &str);
}
