//! Session persistence for incremental generation.
//!
//! Stores the last generated specification and its code in
//! `{root}/{workspace_id}/session.json` so the next run can diff against it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::data::{GeneratedCode, Specification};
use crate::error::StoreError;

const STORE_DIR: &str = ".specforge/workspaces";
const SESSION_FILE: &str = "session.json";

/// Snapshot of one finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSession {
    pub specification: Specification,
    /// entity id -> generated code
    pub code: HashMap<String, GeneratedCode>,
    pub generated_at: DateTime<Utc>,
}

impl WorkspaceSession {
    pub fn new(specification: Specification, code: HashMap<String, GeneratedCode>) -> Self {
        Self {
            specification,
            code,
            generated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    root: PathBuf,
}

impl Default for WorkspaceStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl WorkspaceStore {
    /// # Arguments
    /// * `root` - Optional store folder. If None, defaults to ".specforge/workspaces"
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root: root.unwrap_or_else(|| PathBuf::from(STORE_DIR)),
        }
    }

    fn session_path(&self, workspace_id: &str) -> PathBuf {
        self.root.join(workspace_id).join(SESSION_FILE)
    }

    /// Load the last session of a workspace, or `None` if it never ran.
    pub fn load(&self, workspace_id: &str) -> Result<Option<WorkspaceSession>, StoreError> {
        let path = self.session_path(workspace_id);
        if !path.exists() {
            debug!(workspace = workspace_id, "no saved session");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let session = serde_json::from_str(&content).map_err(|e| StoreError::Decode {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(session))
    }

    /// Save the session, replacing any previous one.
    pub fn save(&self, workspace_id: &str, session: &WorkspaceSession) -> Result<(), StoreError> {
        let path = self.session_path(workspace_id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.display().to_string(),
                source,
            })?;
        }

        let content = serde_json::to_string_pretty(session)
            .map_err(|e| StoreError::Encode(e.to_string()))?;
        fs::write(&path, content).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;

        debug!(workspace = workspace_id, path = %path.display(), "session saved");
        Ok(())
    }
}
