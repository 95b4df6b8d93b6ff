mod model_registry;
mod prompt_registry;

pub use model_registry::{FileModelRegistry, MODELS_FILE, ModelConfig};
pub use prompt_registry::FilePromptRegistry;
