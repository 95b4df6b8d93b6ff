//! The authoring graph: style guides, pages (and components), contexts,
//! assets and templates.
//!
//! Every field defaults when absent so that a partially-filled entity coming
//! from the editor still loads; fingerprinting treats missing values as their
//! defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of snapshots kept on an entity's undo stack.
pub const MAX_HISTORY_STACK: usize = 5;

/// Editor bookkeeping shared by every entity. Never part of a fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityMeta {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub previous_states: Vec<Value>,
    pub current_state_index: usize,
}

impl EntityMeta {
    /// Push a snapshot onto the undo stack.
    ///
    /// Snapshots after the cursor are discarded first, and only the
    /// [`MAX_HISTORY_STACK`] most recent snapshots are kept.
    pub fn record_state(&mut self, snapshot: Value) {
        if self.current_state_index + 1 < self.previous_states.len() {
            self.previous_states.truncate(self.current_state_index + 1);
        }
        self.previous_states.push(snapshot);
        if self.previous_states.len() > MAX_HISTORY_STACK {
            let overflow = self.previous_states.len() - MAX_HISTORY_STACK;
            self.previous_states.drain(..overflow);
        }
        self.current_state_index = self.previous_states.len() - 1;
        self.updated_at = Some(Utc::now());
    }

    pub fn can_undo(&self) -> bool {
        self.current_state_index > 0 && !self.previous_states.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        self.current_state_index + 1 < self.previous_states.len()
    }

    /// Move the cursor back one snapshot and return it.
    pub fn undo(&mut self) -> Option<&Value> {
        if !self.can_undo() {
            return None;
        }
        self.current_state_index -= 1;
        self.previous_states.get(self.current_state_index)
    }

    /// Move the cursor forward one snapshot and return it.
    pub fn redo(&mut self) -> Option<&Value> {
        if !self.can_redo() {
            return None;
        }
        self.current_state_index += 1;
        self.previous_states.get(self.current_state_index)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorPalette {
    pub primary: String,
    pub secondary: String,
    pub accent: String,
    pub background: String,
    pub surface: String,
    pub text: String,
}

impl ColorPalette {
    /// Named colors in declaration order, skipping unset ones.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("primary", self.primary.as_str()),
            ("secondary", self.secondary.as_str()),
            ("accent", self.accent.as_str()),
            ("background", self.background.as_str()),
            ("surface", self.surface.as_str()),
            ("text", self.text.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomColor {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleColors {
    pub light: ColorPalette,
    pub dark: ColorPalette,
    pub custom: Vec<CustomColor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Typography {
    pub heading: String,
    pub body: String,
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Animation {
    pub name: String,
    pub config: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleGuide {
    pub id: String,
    pub name: String,
    pub theme_mode: ThemeMode,
    pub colors: StyleColors,
    pub typography: Typography,
    pub spacing: f64,
    pub border_radius: f64,
    pub animations: Vec<Animation>,
    #[serde(flatten)]
    pub meta: EntityMeta,
}

impl StyleGuide {
    /// The palette matching the guide's theme mode.
    pub fn active_palette(&self) -> &ColorPalette {
        match self.theme_mode {
            ThemeMode::Light => &self.colors.light,
            ThemeMode::Dark => &self.colors.dark,
        }
    }
}

/// Discriminant of a page-category entity.
///
/// Unknown discriminants are preserved as [`PageKind::Other`] so they survive
/// a load/save cycle; generation refuses them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PageKind {
    #[default]
    Page,
    Component,
    Folder,
    DataModel,
    Asset,
    Style,
    AiGeneration,
    Other(String),
}

impl PageKind {
    pub fn as_str(&self) -> &str {
        match self {
            PageKind::Page => "page",
            PageKind::Component => "component",
            PageKind::Folder => "folder",
            PageKind::DataModel => "data-model",
            PageKind::Asset => "asset",
            PageKind::Style => "style",
            PageKind::AiGeneration => "ai-generation",
            PageKind::Other(raw) => raw,
        }
    }
}

impl From<String> for PageKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "page" => PageKind::Page,
            "component" => PageKind::Component,
            "folder" => PageKind::Folder,
            "data-model" => PageKind::DataModel,
            "asset" => PageKind::Asset,
            "style" => PageKind::Style,
            "ai-generation" => PageKind::AiGeneration,
            _ => PageKind::Other(raw),
        }
    }
}

impl From<PageKind> for String {
    fn from(kind: PageKind) -> Self {
        kind.as_str().to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Page {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PageKind,
    pub icon: String,
    pub main_prompt: String,
    pub reference_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub props: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_in_component_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub styling: Option<Value>,
    #[serde(flatten)]
    pub meta: EntityMeta,
}

impl Page {
    pub fn references(&self, id: &str) -> bool {
        self.reference_ids.iter().any(|r| r == id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    #[default]
    Text,
    Image,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Context {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ContextKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_prompt: Option<String>,
    pub reference_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    #[serde(flatten)]
    pub meta: EntityMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Asset {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub link: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub insights: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    #[serde(flatten)]
    pub meta: EntityMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub main_prompt: String,
    pub reference_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub meta: EntityMeta,
}

/// Entity categories of a [`Specification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Styles,
    Pages,
    Contexts,
    Assets,
    Templates,
}

impl Category {
    /// Categories that take part in change detection, in iteration order.
    pub const TRACKED: [Category; 4] = [
        Category::Styles,
        Category::Pages,
        Category::Contexts,
        Category::Assets,
    ];
}

/// Borrowed view of one entity of any category.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Style(&'a StyleGuide),
    Page(&'a Page),
    Context(&'a Context),
    Asset(&'a Asset),
    Template(&'a Template),
}

impl<'a> EntityRef<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            EntityRef::Style(s) => &s.id,
            EntityRef::Page(p) => &p.id,
            EntityRef::Context(c) => &c.id,
            EntityRef::Asset(a) => &a.id,
            EntityRef::Template(t) => &t.id,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            EntityRef::Style(s) => &s.name,
            EntityRef::Page(p) => &p.name,
            EntityRef::Context(c) => &c.name,
            EntityRef::Asset(a) => &a.name,
            EntityRef::Template(t) => &t.name,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            EntityRef::Style(_) => Category::Styles,
            EntityRef::Page(_) => Category::Pages,
            EntityRef::Context(_) => Category::Contexts,
            EntityRef::Asset(_) => Category::Assets,
            EntityRef::Template(_) => Category::Templates,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Specification {
    pub name: String,
    pub styles: Vec<StyleGuide>,
    pub pages: Vec<Page>,
    pub contexts: Vec<Context>,
    pub assets: Vec<Asset>,
    pub templates: Vec<Template>,
}

impl Specification {
    /// Entities of one category in storage order.
    pub fn entities(&self, category: Category) -> Vec<EntityRef<'_>> {
        match category {
            Category::Styles => self.styles.iter().map(EntityRef::Style).collect(),
            Category::Pages => self.pages.iter().map(EntityRef::Page).collect(),
            Category::Contexts => self.contexts.iter().map(EntityRef::Context).collect(),
            Category::Assets => self.assets.iter().map(EntityRef::Asset).collect(),
            Category::Templates => self.templates.iter().map(EntityRef::Template).collect(),
        }
    }

    /// Every tracked entity: styles, pages, contexts, then assets.
    pub fn all_entities(&self) -> Vec<EntityRef<'_>> {
        Category::TRACKED
            .iter()
            .flat_map(|category| self.entities(*category))
            .collect()
    }

    pub fn find_entity(&self, id: &str) -> Option<EntityRef<'_>> {
        self.all_entities()
            .into_iter()
            .chain(self.templates.iter().map(EntityRef::Template))
            .find(|entity| entity.id() == id)
    }

    pub fn find_in(&self, category: Category, id: &str) -> Option<EntityRef<'_>> {
        self.entities(category)
            .into_iter()
            .find(|entity| entity.id() == id)
    }

    pub fn page(&self, id: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == id)
    }

    /// The style guide prompts are rendered against: the first one stored.
    pub fn active_style_guide(&self) -> Option<&StyleGuide> {
        self.styles.first()
    }

    /// Components referenced directly (one hop) by `page`.
    pub fn referenced_components(&self, page: &Page) -> Vec<&Page> {
        self.pages
            .iter()
            .filter(|p| p.kind == PageKind::Component && page.references(&p.id))
            .collect()
    }

    /// Contexts referenced directly (one hop) by `page`.
    pub fn referenced_contexts(&self, page: &Page) -> Vec<&Context> {
        self.contexts
            .iter()
            .filter(|c| page.references(&c.id))
            .collect()
    }

    /// Assets referenced directly (one hop) by `page`.
    pub fn referenced_assets(&self, page: &Page) -> Vec<&Asset> {
        self.assets.iter().filter(|a| page.references(&a.id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_entities_load_with_defaults() {
        let spec: Specification = serde_json::from_value(json!({
            "pages": [{ "id": "p1" }],
            "styles": [{ "id": "s1", "colors": { "light": { "primary": "#000" } } }]
        }))
        .unwrap();

        assert_eq!(spec.pages[0].kind, PageKind::Page);
        assert!(spec.pages[0].reference_ids.is_empty());
        assert_eq!(spec.styles[0].colors.light.primary, "#000");
        assert_eq!(spec.styles[0].theme_mode, ThemeMode::Light);
    }

    #[test]
    fn unknown_page_kind_round_trips() {
        let page: Page = serde_json::from_value(json!({ "id": "x", "type": "widget" })).unwrap();
        assert_eq!(page.kind, PageKind::Other("widget".to_string()));

        let back = serde_json::to_value(&page).unwrap();
        assert_eq!(back["type"], "widget");
    }

    #[test]
    fn history_meta_is_read_from_camel_case() {
        let page: Page = serde_json::from_value(json!({
            "id": "p1",
            "previousStates": [{ "mainPrompt": "old" }],
            "currentStateIndex": 0,
            "updatedAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(page.meta.previous_states.len(), 1);
        assert!(page.meta.updated_at.is_some());
    }

    #[test]
    fn history_keeps_last_five_states() {
        let mut meta = EntityMeta::default();
        for i in 0..8 {
            meta.record_state(json!({ "n": i }));
        }

        assert_eq!(meta.previous_states.len(), MAX_HISTORY_STACK);
        assert_eq!(meta.previous_states[0], json!({ "n": 3 }));
        assert_eq!(meta.current_state_index, MAX_HISTORY_STACK - 1);
    }

    #[test]
    fn undo_redo_moves_cursor_and_recording_drops_redo_tail() {
        let mut meta = EntityMeta::default();
        meta.record_state(json!(1));
        meta.record_state(json!(2));
        meta.record_state(json!(3));

        assert_eq!(meta.undo(), Some(&json!(2)));
        assert_eq!(meta.undo(), Some(&json!(1)));
        assert_eq!(meta.undo(), None);
        assert_eq!(meta.redo(), Some(&json!(2)));

        meta.record_state(json!(4));
        assert_eq!(meta.previous_states, vec![json!(1), json!(2), json!(4)]);
        assert!(!meta.can_redo());
    }

    #[test]
    fn one_hop_references_filter_by_category() {
        let spec: Specification = serde_json::from_value(json!({
            "pages": [
                { "id": "home", "type": "page", "referenceIds": ["btn", "ctx", "img", "other"] },
                { "id": "btn", "type": "component" },
                { "id": "other", "type": "page" }
            ],
            "contexts": [{ "id": "ctx", "content": "brand voice" }],
            "assets": [{ "id": "img", "link": "https://x/y.png" }]
        }))
        .unwrap();

        let home = spec.page("home").unwrap();
        let components: Vec<&str> = spec.referenced_components(home).iter().map(|p| p.id.as_str()).collect();
        assert_eq!(components, vec!["btn"]);
        assert_eq!(spec.referenced_contexts(home).len(), 1);
        assert_eq!(spec.referenced_assets(home).len(), 1);
    }
}
