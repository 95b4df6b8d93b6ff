//! Deterministic fingerprints of a specification or a single page.
//!
//! Each entity is projected onto the fields that influence generated output
//! (timestamps and undo history are dropped), entity arrays are sorted by id,
//! reference and tag arrays are sorted, and the projection is hashed as
//! canonical JSON with SHA-256. `serde_json::Value` keeps object keys ordered,
//! so key insertion order never leaks into the digest.

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::data::{Asset, Context, EntityRef, Page, Specification, StyleGuide, Template};
use crate::error::GenerationError;

/// Fingerprint of the whole specification.
pub fn fingerprint_spec(spec: &Specification) -> String {
    let view = json!({
        "styles": sorted_views(&spec.styles, |s| &s.id, style_view),
        "pages": sorted_views(&spec.pages, |p| &p.id, page_view),
        "contexts": sorted_views(&spec.contexts, |c| &c.id, context_view),
        "assets": sorted_views(&spec.assets, |a| &a.id, asset_view),
        "templates": sorted_views(&spec.templates, |t| &t.id, template_view),
    });
    digest_value(&view)
}

/// Fingerprint of one page together with the contexts and assets it
/// references and the global style guides.
///
/// This is the key a client uses to ask "has this exact page configuration
/// been generated before".
pub fn fingerprint_page(spec: &Specification, page_id: &str) -> Result<String, GenerationError> {
    let page = spec
        .page(page_id)
        .ok_or_else(|| GenerationError::NotFound(format!("page {page_id}")))?;

    let mut contexts = spec.referenced_contexts(page);
    contexts.sort_by(|a, b| a.id.cmp(&b.id));
    let mut assets = spec.referenced_assets(page);
    assets.sort_by(|a, b| a.id.cmp(&b.id));
    let mut styles: Vec<&StyleGuide> = spec.styles.iter().collect();
    styles.sort_by(|a, b| a.id.cmp(&b.id));

    let view = json!({
        "page": page_view(page),
        "contexts": contexts
            .iter()
            .map(|c| json!({ "id": c.id, "content": c.content, "type": c.kind }))
            .collect::<Vec<_>>(),
        "assets": assets
            .iter()
            .map(|a| json!({ "id": a.id, "link": a.link, "type": a.kind }))
            .collect::<Vec<_>>(),
        "styles": styles
            .iter()
            .map(|s| json!({
                "colors": s.colors,
                "typography": s.typography,
                "spacing": s.spacing,
                "borderRadius": s.border_radius,
            }))
            .collect::<Vec<_>>(),
    });
    Ok(digest_value(&view))
}

/// Fingerprint of a single entity's own generation-relevant fields.
pub fn fingerprint_entity(entity: EntityRef<'_>) -> String {
    let view = match entity {
        EntityRef::Style(s) => style_view(s),
        EntityRef::Page(p) => page_view(p),
        EntityRef::Context(c) => context_view(c),
        EntityRef::Asset(a) => asset_view(a),
        EntityRef::Template(t) => template_view(t),
    };
    digest_value(&view)
}

/// SHA-256 of raw text, hex encoded.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn digest_value(value: &Value) -> String {
    hash_content(&value.to_string())
}

fn sorted_views<T>(items: &[T], id: impl Fn(&T) -> &String, view: impl Fn(&T) -> Value) -> Vec<Value> {
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by(|a, b| id(a).cmp(id(b)));
    sorted.into_iter().map(view).collect()
}

fn sorted(ids: &[String]) -> Vec<&str> {
    let mut ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    ids.sort_unstable();
    ids
}

/// Generation-relevant fields of a style guide. Prompts embed this view too,
/// so metadata and undo history never reach the text generator.
pub(crate) fn style_view(style: &StyleGuide) -> Value {
    json!({
        "id": style.id,
        "name": style.name,
        "themeMode": style.theme_mode,
        "colors": style.colors,
        "typography": style.typography,
        "spacing": style.spacing,
        "borderRadius": style.border_radius,
        "animations": style.animations,
    })
}

pub(crate) fn page_view(page: &Page) -> Value {
    json!({
        "id": page.id,
        "name": page.name,
        "type": page.kind,
        "mainPrompt": page.main_prompt,
        "referenceIds": sorted(&page.reference_ids),
        "route": page.route,
        "category": page.category,
        "componentSource": page.component_source,
        "builtInComponentId": page.built_in_component_id,
        "props": page.props,
        "styling": page.styling,
    })
}

pub(crate) fn context_view(context: &Context) -> Value {
    json!({
        "id": context.id,
        "name": context.name,
        "type": context.kind,
        "content": context.content,
        "mainPrompt": context.main_prompt,
        "referenceIds": sorted(&context.reference_ids),
    })
}

fn asset_view(asset: &Asset) -> Value {
    json!({
        "id": asset.id,
        "name": asset.name,
        "type": asset.kind,
        "link": asset.link,
    })
}

fn template_view(template: &Template) -> Value {
    json!({
        "id": template.id,
        "name": template.name,
        "category": template.category,
        "mainPrompt": template.main_prompt,
        "referenceIds": sorted(&template.reference_ids),
        "tags": sorted(&template.tags),
    })
}
