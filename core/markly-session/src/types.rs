//! Persisted document types.
//!
//! The JSON shape is shared with earlier releases of the editor, so field names
//! are camelCase on disk:
//!
//! ```json
//! {
//!   "theme": "dark",
//!   "sidebarWidth": 250,
//!   "lastProjectRoot": "/home/me/notes",
//!   "sessions": {
//!     "/home/me/notes": {
//!       "openedPaths": ["/home/me/notes/a.md"],
//!       "activePath": "/home/me/notes/a.md",
//!       "expandedFolders": [],
//!       "cursorPositions": { "/home/me/notes/a.md": 10 }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SessionError};
use crate::storage::normalize_root;

// ═══════════════════════════════════════════════════════════════════════════════
// Preferences
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

const THEME_KEY: &str = "theme";
const SIDEBAR_WIDTH_KEY: &str = "sidebarWidth";
const EDITOR_WIDTH_PERCENT_KEY: &str = "editorWidthPercent";
const OPEN_TABS_HEIGHT_KEY: &str = "openTabsHeight";
const LINE_BREAKS_KEY: &str = "lineBreaks";
const LINE_WRAPPING_KEY: &str = "lineWrapping";
const SCROLL_SYNC_KEY: &str = "scrollSync";
const LANGUAGE_KEY: &str = "language";
const EDITOR_FONT_FAMILY_KEY: &str = "editorFontFamily";
const EDITOR_FONT_SIZE_KEY: &str = "editorFontSize";
const PREVIEW_FONT_FAMILY_KEY: &str = "previewFontFamily";
const PREVIEW_FONT_SIZE_KEY: &str = "previewFontSize";

const DEFAULT_SIDEBAR_WIDTH: u64 = 250;
const DEFAULT_EDITOR_WIDTH_PERCENT: u64 = 50;
const DEFAULT_OPEN_TABS_HEIGHT: u64 = 192;
const DEFAULT_EDITOR_FONT_FAMILY: &str = "monospace";
const DEFAULT_EDITOR_FONT_SIZE: u64 = 14;
const DEFAULT_PREVIEW_FONT_FAMILY: &str = "sans-serif";
const DEFAULT_PREVIEW_FONT_SIZE: u64 = 16;

/// Global preferences, shared across all projects.
///
/// Stored as the raw top-level JSON values and written back exactly as read,
/// so a value of an unexpected type never fails the document. The accessors
/// fall back to the shipped default for a key that is missing or mistyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences {
    values: Map<String, Value>,
}

impl Default for Preferences {
    fn default() -> Self {
        let mut values = Map::new();
        values.insert(THEME_KEY.to_string(), Value::from("dark"));
        values.insert(SIDEBAR_WIDTH_KEY.to_string(), Value::from(DEFAULT_SIDEBAR_WIDTH));
        values.insert(
            EDITOR_WIDTH_PERCENT_KEY.to_string(),
            Value::from(DEFAULT_EDITOR_WIDTH_PERCENT),
        );
        values.insert(OPEN_TABS_HEIGHT_KEY.to_string(), Value::from(DEFAULT_OPEN_TABS_HEIGHT));
        values.insert(LINE_BREAKS_KEY.to_string(), Value::Bool(true));
        values.insert(LINE_WRAPPING_KEY.to_string(), Value::Bool(true));
        values.insert(SCROLL_SYNC_KEY.to_string(), Value::Bool(true));
        values.insert(LANGUAGE_KEY.to_string(), Value::Null);
        values.insert(
            EDITOR_FONT_FAMILY_KEY.to_string(),
            Value::from(DEFAULT_EDITOR_FONT_FAMILY),
        );
        values.insert(EDITOR_FONT_SIZE_KEY.to_string(), Value::from(DEFAULT_EDITOR_FONT_SIZE));
        values.insert(
            PREVIEW_FONT_FAMILY_KEY.to_string(),
            Value::from(DEFAULT_PREVIEW_FONT_FAMILY),
        );
        values.insert(PREVIEW_FONT_SIZE_KEY.to_string(), Value::from(DEFAULT_PREVIEW_FONT_SIZE));
        Self { values }
    }
}

impl Preferences {
    /// Raw value of any top-level preference key, known or not.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn theme(&self) -> Theme {
        self.values
            .get(THEME_KEY)
            .and_then(|value| Theme::deserialize(value).ok())
            .unwrap_or_default()
    }

    pub fn sidebar_width(&self) -> f64 {
        self.number(SIDEBAR_WIDTH_KEY, DEFAULT_SIDEBAR_WIDTH)
    }

    pub fn editor_width_percent(&self) -> f64 {
        self.number(EDITOR_WIDTH_PERCENT_KEY, DEFAULT_EDITOR_WIDTH_PERCENT)
    }

    pub fn open_tabs_height(&self) -> f64 {
        self.number(OPEN_TABS_HEIGHT_KEY, DEFAULT_OPEN_TABS_HEIGHT)
    }

    pub fn line_breaks(&self) -> bool {
        self.flag(LINE_BREAKS_KEY)
    }

    pub fn line_wrapping(&self) -> bool {
        self.flag(LINE_WRAPPING_KEY)
    }

    pub fn scroll_sync(&self) -> bool {
        self.flag(SCROLL_SYNC_KEY)
    }

    /// UI language; `None` means follow the system.
    pub fn language(&self) -> Option<&str> {
        self.values.get(LANGUAGE_KEY).and_then(Value::as_str)
    }

    pub fn editor_font_family(&self) -> &str {
        self.text(EDITOR_FONT_FAMILY_KEY, DEFAULT_EDITOR_FONT_FAMILY)
    }

    pub fn editor_font_size(&self) -> f64 {
        self.number(EDITOR_FONT_SIZE_KEY, DEFAULT_EDITOR_FONT_SIZE)
    }

    pub fn preview_font_family(&self) -> &str {
        self.text(PREVIEW_FONT_FAMILY_KEY, DEFAULT_PREVIEW_FONT_FAMILY)
    }

    pub fn preview_font_size(&self) -> f64 {
        self.number(PREVIEW_FONT_SIZE_KEY, DEFAULT_PREVIEW_FONT_SIZE)
    }

    fn number(&self, key: &str, default: u64) -> f64 {
        self.values
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(default as f64)
    }

    /// Every boolean preference defaults to on.
    fn flag(&self, key: &str) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(true)
    }

    fn text<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.values.get(key).and_then(Value::as_str).unwrap_or(default)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════════════════════════

/// Editor state for one project root. Always written wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(default)]
    pub opened_paths: Vec<String>,
    #[serde(default)]
    pub active_path: Option<String>,
    #[serde(default)]
    pub expanded_folders: Vec<String>,
    /// Caret offset keyed by file path, or by tab id for untitled tabs.
    #[serde(default)]
    pub cursor_positions: BTreeMap<String, usize>,
}

/// The single per-user configuration document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    #[serde(flatten)]
    pub preferences: Preferences,
    #[serde(default)]
    pub last_project_root: Option<String>,
    /// One entry per project ever opened. Never evicted.
    #[serde(default)]
    pub sessions: BTreeMap<String, SessionData>,
}

impl ConfigDocument {
    /// Session saved for `root`. Keys written with a trailing separator match too.
    pub fn session(&self, root: &str) -> Option<&SessionData> {
        let root = normalize_root(root);
        self.sessions.get(root).or_else(|| {
            self.sessions
                .iter()
                .find(|(key, _)| normalize_root(key) == root)
                .map(|(_, session)| session)
        })
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|source| SessionError::Json {
            context: "serialize config document".to_string(),
            source,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Partial Writes
// ═══════════════════════════════════════════════════════════════════════════════

const LAST_PROJECT_ROOT_KEY: &str = "lastProjectRoot";
const SESSIONS_KEY: &str = "sessions";

/// A partial document waiting to be merged into the file on disk.
///
/// Top-level fields replace their on-disk counterparts. Session entries are merged
/// per project root so that writing project A never drops project B.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigPatch {
    fields: Map<String, Value>,
    sessions: Option<BTreeMap<String, SessionData>>,
}

impl ConfigPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last_project_root(mut self, root: Option<&str>) -> Self {
        self.fields.insert(
            LAST_PROJECT_ROOT_KEY.to_string(),
            root.map_or(Value::Null, |r| Value::String(r.to_string())),
        );
        self
    }

    pub fn with_session(mut self, root: &str, session: SessionData) -> Self {
        self.sessions
            .get_or_insert_with(BTreeMap::new)
            .insert(root.to_string(), session);
        self
    }

    /// Sets one top-level preference key (e.g. `"theme"`).
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.sessions.is_none()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn sessions(&self) -> Option<&BTreeMap<String, SessionData>> {
        self.sessions.as_ref()
    }

    /// Folds a newer patch into this one. Later values win per key.
    pub fn merge(&mut self, later: ConfigPatch) {
        self.fields.extend(later.fields);
        if let Some(sessions) = later.sessions {
            self.sessions
                .get_or_insert_with(BTreeMap::new)
                .extend(sessions);
        }
    }

    /// Applies the patch to a raw on-disk document (must be a JSON object).
    pub fn apply_to(&self, document: &mut Map<String, Value>) -> Result<()> {
        for (key, value) in &self.fields {
            document.insert(key.clone(), value.clone());
        }

        let Some(sessions) = &self.sessions else {
            return Ok(());
        };

        let slot = document
            .entry(SESSIONS_KEY.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(existing) = slot {
            for (root, session) in sessions {
                let value = serde_json::to_value(session).map_err(|source| SessionError::Json {
                    context: format!("serialize session for {}", root),
                    source,
                })?;
                existing.insert(root.clone(), value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session(path: &str) -> SessionData {
        SessionData {
            opened_paths: vec![path.to_string()],
            active_path: Some(path.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_match_shipped_config() {
        let value = ConfigDocument::default().to_value().unwrap();
        assert_eq!(value["theme"], "dark");
        assert_eq!(value["sidebarWidth"], json!(250));
        assert_eq!(value["editorFontFamily"], "monospace");
        assert_eq!(value["lastProjectRoot"], Value::Null);
        assert_eq!(value["sessions"], json!({}));
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let doc: ConfigDocument = serde_json::from_value(json!({
            "theme": "light",
            "futureSetting": {"nested": true},
            "sessions": {}
        }))
        .unwrap();
        assert_eq!(doc.preferences.theme(), Theme::Light);
        assert_eq!(doc.preferences.editor_font_size(), 14.0);

        let back = doc.to_value().unwrap();
        assert_eq!(back["futureSetting"], json!({"nested": true}));
        assert!(back.get("sessions").is_some());
    }

    #[test]
    fn test_mistyped_preferences_do_not_fail_the_document() {
        let raw = json!({
            "theme": "solarized",
            "sidebarWidth": null,
            "lineWrapping": "yes",
            "lastProjectRoot": "/p",
            "sessions": {"/p": {"openedPaths": ["/p/a.md"]}}
        });
        let doc: ConfigDocument = serde_json::from_value(raw).unwrap();
        assert_eq!(doc.last_project_root.as_deref(), Some("/p"));
        assert_eq!(doc.sessions["/p"].opened_paths, vec!["/p/a.md"]);

        assert_eq!(doc.preferences.theme(), Theme::Dark);
        assert_eq!(doc.preferences.sidebar_width(), 250.0);
        assert!(doc.preferences.line_wrapping());

        let back = doc.to_value().unwrap();
        assert_eq!(back["theme"], "solarized");
        assert_eq!(back["sidebarWidth"], Value::Null);
        assert_eq!(back["lineWrapping"], "yes");
    }

    #[test]
    fn test_preference_numbers_keep_their_json_form() {
        let doc: ConfigDocument =
            serde_json::from_value(json!({"sidebarWidth": 300, "editorFontSize": 13.5})).unwrap();
        assert_eq!(doc.preferences.sidebar_width(), 300.0);
        let back = doc.to_value().unwrap();
        assert_eq!(back["sidebarWidth"].to_string(), "300");
        assert_eq!(back["editorFontSize"].to_string(), "13.5");
    }

    #[test]
    fn test_session_lookup_ignores_trailing_separator() {
        let doc: ConfigDocument = serde_json::from_value(json!({
            "sessions": {"/p/": {"openedPaths": ["/p/a.md"]}, "/q": {"openedPaths": []}}
        }))
        .unwrap();
        assert_eq!(doc.session("/p").unwrap().opened_paths, vec!["/p/a.md"]);
        assert!(doc.session("/q/").is_some());
        assert!(doc.session("/r").is_none());
    }

    #[test]
    fn test_session_fields_default_when_missing() {
        let session: SessionData =
            serde_json::from_value(json!({"openedPaths": ["/p/a.md"]})).unwrap();
        assert_eq!(session.active_path, None);
        assert!(session.expanded_folders.is_empty());
        assert!(session.cursor_positions.is_empty());
    }

    #[test]
    fn test_patch_merge_keeps_sessions_for_both_roots() {
        let mut pending = ConfigPatch::new().with_session("/a", session("/a/1.md"));
        pending.merge(ConfigPatch::new().with_session("/b", session("/b/1.md")));
        let sessions = pending.sessions().unwrap();
        assert!(sessions.contains_key("/a"));
        assert!(sessions.contains_key("/b"));
    }

    #[test]
    fn test_patch_merge_later_field_wins() {
        let mut pending = ConfigPatch::new().with_field("theme", json!("light"));
        pending.merge(ConfigPatch::new().with_field("theme", json!("dark")));
        assert_eq!(pending.fields()["theme"], "dark");
    }

    #[test]
    fn test_apply_to_merges_sessions_per_key() {
        let mut disk = json!({
            "theme": "dark",
            "sessions": {"/a": {"openedPaths": ["/a/old.md"]}, "/b": {"openedPaths": ["/b/x.md"]}}
        })
        .as_object()
        .cloned()
        .unwrap();

        ConfigPatch::new()
            .with_session("/a", session("/a/new.md"))
            .with_last_project_root(Some("/a"))
            .apply_to(&mut disk)
            .unwrap();

        assert_eq!(disk["sessions"]["/a"]["openedPaths"], json!(["/a/new.md"]));
        assert_eq!(disk["sessions"]["/b"]["openedPaths"], json!(["/b/x.md"]));
        assert_eq!(disk["lastProjectRoot"], "/a");
        assert_eq!(disk["theme"], "dark");
    }

    #[test]
    fn test_apply_to_replaces_non_object_sessions() {
        let mut disk = json!({"sessions": 7}).as_object().cloned().unwrap();
        ConfigPatch::new()
            .with_session("/a", session("/a/1.md"))
            .apply_to(&mut disk)
            .unwrap();
        assert!(disk["sessions"]["/a"].is_object());
    }

    #[test]
    fn test_empty_patch() {
        assert!(ConfigPatch::new().is_empty());
        assert!(!ConfigPatch::new().with_last_project_root(None).is_empty());
    }
}
