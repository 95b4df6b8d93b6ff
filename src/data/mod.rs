mod cache;
mod generated;
mod specification;

pub use cache::{CacheEntry, CodeCache};
pub use generated::{FileKind, GeneratedCode, GeneratedFile, GenerationMetadata};
pub use specification::{
    Animation, Asset, Category, ColorPalette, Context, ContextKind, CustomColor, EntityMeta,
    EntityRef, MAX_HISTORY_STACK, Page, PageKind, Specification, StyleColors, StyleGuide,
    Template, ThemeMode, Typography,
};
