//! One-shot upgrade of the flat single-project config.
//!
//! Releases before multi-project support stored one session inline:
//!
//! ```json
//! { "theme": "dark", "projectRoot": "/p", "openedPaths": ["/p/a.md"], "activePath": "/p/a.md",
//!   "expandedFolders": [], "cursorPositions": {} }
//! ```
//!
//! [`migrate`] moves those fields under `sessions[projectRoot]`. Detection requires
//! both an `openedPaths` array and the absence of `sessions`, so a migrated document
//! is never detected again even if it still carries stray legacy keys.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, SessionError};
use crate::types::{ConfigDocument, Preferences, SessionData};

/// The old flat document shape.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyDocument {
    #[serde(flatten)]
    pub preferences: Preferences,
    #[serde(default)]
    pub project_root: Option<String>,
    #[serde(default)]
    pub opened_paths: Vec<String>,
    #[serde(default)]
    pub active_path: Option<String>,
    #[serde(default)]
    pub expanded_folders: Vec<String>,
    #[serde(default)]
    pub cursor_positions: BTreeMap<String, usize>,
}

pub fn is_legacy(raw: &Value) -> bool {
    let Some(object) = raw.as_object() else {
        return false;
    };
    object.get("openedPaths").is_some_and(Value::is_array) && !object.contains_key("sessions")
}

pub fn migrate(legacy: LegacyDocument) -> ConfigDocument {
    let mut sessions = BTreeMap::new();

    if let Some(root) = legacy.project_root.as_ref() {
        if !legacy.opened_paths.is_empty() {
            sessions.insert(
                root.clone(),
                SessionData {
                    opened_paths: legacy.opened_paths,
                    active_path: legacy.active_path,
                    expanded_folders: legacy.expanded_folders,
                    cursor_positions: legacy.cursor_positions,
                },
            );
        }
    }

    ConfigDocument {
        preferences: legacy.preferences,
        last_project_root: legacy.project_root,
        sessions,
    }
}

/// Deserializes a raw legacy document and migrates it.
pub fn migrate_value(raw: Value) -> Result<ConfigDocument> {
    let legacy: LegacyDocument = serde_json::from_value(raw).map_err(|source| SessionError::Json {
        context: "parse legacy config".to_string(),
        source,
    })?;
    Ok(migrate(legacy))
}
