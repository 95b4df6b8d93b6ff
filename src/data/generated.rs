use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a generated or managed file holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Page,
    #[default]
    Component,
    Style,
    Config,
    Asset,
    Integration,
    Utility,
}

impl FileKind {
    /// Infer a file's kind from its path.
    pub fn from_path(path: &str) -> Self {
        if path.contains("/page.") || path.starts_with("page.") {
            FileKind::Page
        } else if [".css", ".scss", ".sass", ".less"]
            .iter()
            .any(|ext| path.ends_with(ext))
        {
            FileKind::Style
        } else if path.contains("/api/") || path.starts_with("api/") {
            FileKind::Integration
        } else if path.contains("/lib/")
            || path.contains("/utils/")
            || path.starts_with("lib/")
            || path.starts_with("utils/")
        {
            FileKind::Utility
        } else if path.contains("config") {
            FileKind::Config
        } else {
            FileKind::Component
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
    pub kind: FileKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub entity_id: String,
    pub content_fingerprint: String,
    pub generated_at: DateTime<Utc>,
    /// Model that produced the files, or `"template"` for style guides.
    pub model_identifier: String,
}

/// Everything produced for one entity in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCode {
    pub files: Vec<GeneratedFile>,
    pub dependency_entity_ids: Vec<String>,
    pub metadata: GenerationMetadata,
}
