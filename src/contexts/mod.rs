mod code_generator;
mod file_cache;
mod memory_cache;
mod prompt_builder;
mod response_parser;
mod stylesheet;
mod text_generator;

pub use code_generator::{CodeGenerator, ModelRegistry, SingleModel, TEMPLATE_MODEL};
pub use file_cache::{FileCodeCache, prompt_model_hash};
pub use memory_cache::{CacheStats, MemoryCodeCache};
pub use prompt_builder::{
    BuiltinPrompts, COMPONENT_PROMPT, PAGE_PROMPT, Prompt, PromptBuilder, PromptKey, PromptRegistry,
    SYSTEM_PROMPT, populate,
};
pub use response_parser::{default_path, parse_response, slugify};
pub use stylesheet::{GLOBAL_STYLESHEET, render_stylesheet, stylesheet_path};
pub use text_generator::{Model, OpenAiTextGenerator, TextGenerator};
