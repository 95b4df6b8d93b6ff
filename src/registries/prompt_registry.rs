use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::contexts::{PromptKey, PromptRegistry};
use crate::error::GenerationError;

/// File-based implementation of PromptRegistry
/// Loads prompt templates from YAML files in the prompts/ directory, falling
/// back to the built-in template when no file exists for a key.
#[derive(Clone, Debug)]
pub struct FilePromptRegistry {
    prompts_dir: PathBuf,
}

impl FilePromptRegistry {
    /// Creates a new FilePromptRegistry
    ///
    /// # Arguments
    /// * `prompts_dir` - Optional path to prompts directory (defaults to "prompts")
    pub fn new(prompts_dir: Option<PathBuf>) -> Self {
        Self {
            prompts_dir: prompts_dir.unwrap_or_else(|| PathBuf::from("prompts")),
        }
    }
}

impl PromptRegistry for FilePromptRegistry {
    fn template(&self, key: PromptKey) -> Result<String, GenerationError> {
        let prompt_path = self.prompts_dir.join(format!("{}.yml", key.as_str()));

        if !prompt_path.exists() {
            return Ok(key.builtin().to_string());
        }

        debug!(path = %prompt_path.display(), "loading prompt override");
        fs::read_to_string(&prompt_path)
            .map_err(|e| {
                GenerationError::Prompt(format!(
                    "failed to read prompt template {}: {}",
                    prompt_path.display(),
                    e
                ))
            })
            .and_then(|content| extract_template(&content))
    }
}

/// Extracts the template field from a YAML prompt file
fn extract_template(yaml_content: &str) -> Result<String, GenerationError> {
    use yaml_rust::YamlLoader;

    let docs = YamlLoader::load_from_str(yaml_content)
        .map_err(|e| GenerationError::Prompt(format!("invalid YAML: {}", e)))?;

    let Some(doc) = docs.first() else {
        return Err(GenerationError::Prompt("empty YAML document".to_string()));
    };

    doc["template"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| GenerationError::Prompt("no template field found in prompt file".to_string()))
}
