use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::contexts::{Model, ModelRegistry};
use crate::error::StoreError;
use crate::task_manager::TaskKind;

pub const MODELS_FILE: &str = "models.yml";

/// Model configuration for one task kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelConfig {
    pub model: String,
    pub parallel: bool,
}

/// File-based implementation of ModelRegistry
/// Loads task-kind-to-model mappings from `{dir}/models.yml`:
///
/// ```yaml
/// style-guide: gpt-4o-mini
/// page:
///   model: gpt-4o
///   parallel: true
/// ```
#[derive(Clone, Debug)]
pub struct FileModelRegistry {
    entries: HashMap<String, ModelConfig>,
    default_model: String,
    default_parallel: bool,
}

impl FileModelRegistry {
    /// Loads the registry from `{dir}/models.yml`
    ///
    /// # Arguments
    /// * `dir` - Directory holding the registry file; a missing file yields an empty registry
    /// * `default_model` - Model used for task kinds absent from the file
    /// * `default_parallel` - Parallel setting for task kinds absent from the file
    pub fn load(dir: &Path, default_model: &str, default_parallel: bool) -> Result<Self, StoreError> {
        let path = dir.join(MODELS_FILE);
        let entries = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.display().to_string(),
                source,
            })?;
            parse_registry(&content, default_model, default_parallel).map_err(|message| {
                StoreError::Decode {
                    path: path.display().to_string(),
                    message,
                }
            })?
        } else {
            HashMap::new()
        };

        Ok(Self {
            entries,
            default_model: default_model.to_string(),
            default_parallel,
        })
    }

    fn config_for(&self, kind: TaskKind) -> Option<&ModelConfig> {
        self.entries.get(kind.as_str())
    }
}

impl ModelRegistry for FileModelRegistry {
    fn model_for(&self, kind: TaskKind) -> Model {
        let name = self
            .config_for(kind)
            .map(|config| config.model.clone())
            .unwrap_or_else(|| self.default_model.clone());
        Model { name }
    }

    fn can_run_parallel(&self, kind: TaskKind) -> bool {
        self.config_for(kind)
            .map(|config| config.parallel)
            .unwrap_or(self.default_parallel)
    }
}

/// Parses the YAML registry file into a HashMap
/// Supports both the short format (string) and the long format (object with model and parallel)
fn parse_registry(
    yaml_content: &str,
    default_model: &str,
    default_parallel: bool,
) -> Result<HashMap<String, ModelConfig>, String> {
    use yaml_rust::{Yaml, YamlLoader};

    let docs = YamlLoader::load_from_str(yaml_content)
        .map_err(|e| format!("invalid registry YAML: {}", e))?;

    let mut registry = HashMap::new();
    let Some(hash) = docs.first().and_then(Yaml::as_hash) else {
        return Ok(registry);
    };

    for (key, value) in hash {
        let Some(k) = key.as_str() else {
            continue;
        };
        let config = if let Some(model) = value.as_str() {
            ModelConfig {
                model: model.to_string(),
                parallel: default_parallel,
            }
        } else if let Some(v_hash) = value.as_hash() {
            let model = v_hash
                .get(&Yaml::String("model".to_string()))
                .and_then(Yaml::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| default_model.to_string());
            let parallel = v_hash
                .get(&Yaml::String("parallel".to_string()))
                .and_then(Yaml::as_bool)
                .unwrap_or(default_parallel);
            ModelConfig { model, parallel }
        } else {
            ModelConfig {
                model: default_model.to_string(),
                parallel: default_parallel,
            }
        };
        registry.insert(k.to_string(), config);
    }

    Ok(registry)
}
