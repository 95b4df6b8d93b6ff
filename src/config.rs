//! Generator configuration: `specforge.yml` overlaid with environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::StoreError;

pub const CONFIG_FILE: &str = "specforge.yml";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub model: String,
    pub api_base: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub prompts_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            request_timeout_secs: 120,
            max_tokens: 4000,
            temperature: 0.7,
            prompts_dir: PathBuf::from("prompts"),
            cache_dir: PathBuf::from(".specforge"),
        }
    }
}

impl GeneratorConfig {
    /// Load configuration from `path` (or `specforge.yml` in the working
    /// directory) and apply environment overrides. A missing file yields the
    /// defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, StoreError> {
        dotenvy::dotenv().ok();

        let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.display().to_string(),
                source,
            })?;
            Self::from_yaml(&content).map_err(|message| StoreError::Decode {
                path: path.display().to_string(),
                message,
            })?
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    /// Overlay values found through `lookup`. Unparseable numbers are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("SPECFORGE_MODEL") {
            self.model = model;
        }
        if let Some(api_base) = lookup("SPECFORGE_API_BASE") {
            self.api_base = api_base;
        }
        if let Some(api_key) = lookup("OPENAI_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Some(timeout) = lookup("SPECFORGE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.request_timeout_secs = timeout;
        }
        if let Some(max_tokens) = lookup("SPECFORGE_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.max_tokens = max_tokens;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = GeneratorConfig::from_yaml("model: gpt-4o-mini\nmax_tokens: 2000\n").unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_tokens, 2000);
        assert_eq!(config.request_timeout_secs, 120);
        assert_eq!(config.cache_dir, PathBuf::from(".specforge"));
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(GeneratorConfig::from_yaml("").unwrap(), GeneratorConfig::default());
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        assert!(GeneratorConfig::from_yaml("max_tokens: [").is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let vars: HashMap<&str, &str> = [
            ("SPECFORGE_MODEL", "local-model"),
            ("OPENAI_API_KEY", "sk-test"),
            ("SPECFORGE_TIMEOUT_SECS", "5"),
            ("SPECFORGE_MAX_TOKENS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = GeneratorConfig::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.model, "local-model");
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_tokens, 4000);
    }

    #[test]
    fn load_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yml");
        fs::write(&path, "prompts_dir: my-prompts\ntemperature: 0.2\n").unwrap();

        let config = GeneratorConfig::load(Some(&path)).unwrap();
        assert_eq!(config.prompts_dir, PathBuf::from("my-prompts"));
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
    }
}
