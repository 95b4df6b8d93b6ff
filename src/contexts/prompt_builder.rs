use serde::Serialize;
use std::collections::HashMap;

use crate::data::{Page, PageKind, Specification};
use crate::error::GenerationError;
use crate::fingerprint::{context_view, page_view, style_view};

pub const SYSTEM_PROMPT: &str = r#"You are an expert code generator that converts design specifications into production-ready Next.js code.

## Your Role
You function as a transpiler, converting structured specifications into clean, maintainable code:
- Generate type-safe TypeScript code
- Follow Next.js App Router conventions
- Use Tailwind CSS for styling
- Ensure accessibility (WCAG 2.1 AA)
- Write semantic HTML

## Styling Guidelines
- Follow the provided style guide colors and typography
- Use the design tokens declared in app/globals.css
- Implement responsive, mobile-first layouts

## Component Structure
- Server Components by default
- Client Components only when needed ('use client')
- Files organized under components/, app/ and lib/

## Multi-File Output Format
IMPORTANT: You MUST generate code as multiple files using code blocks with file paths.

Use this exact format for each file:

```tsx file="path/to/file.tsx"
// File content here
```"#;

pub const COMPONENT_PROMPT: &str = r#"Generate a reusable React component based on the specification.

## Requirements
- Create a Client Component if interactive ('use client')
- Define a proper TypeScript props interface
- Implement the functionality described in mainPrompt
- Apply style guide styling
- Handle edge cases and errors

## Input
Component Specification: {{componentSpec}}
Style Guide: {{styleGuide}}
Referenced Components: {{referencedComponents}}

## Output
Return the component as components/[name].tsx"#;

pub const PAGE_PROMPT: &str = r#"Generate a Next.js page component based on the specification.

## Requirements
- Create a Server Component by default
- Implement the layout described in mainPrompt
- Reference and use the specified components
- Apply style guide colors and typography
- Add proper metadata

## Input
Page Specification: {{pageSpec}}
Style Guide: {{styleGuide}}
Referenced Components: {{referencedComponents}}
Referenced Contexts: {{referencedContexts}}

## Output
Return file blocks for:
1. The page component (app/[route]/page.tsx)
2. Any new components needed
3. Any utility functions needed"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKey {
    System,
    Component,
    Page,
}

impl PromptKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKey::System => "system",
            PromptKey::Component => "component",
            PromptKey::Page => "page",
        }
    }

    pub fn builtin(&self) -> &'static str {
        match self {
            PromptKey::System => SYSTEM_PROMPT,
            PromptKey::Component => COMPONENT_PROMPT,
            PromptKey::Page => PAGE_PROMPT,
        }
    }
}

/// Trait for loading prompt templates by key
pub trait PromptRegistry: Send + Sync {
    fn template(&self, key: PromptKey) -> Result<String, GenerationError>;
}

/// Registry serving only the compiled-in templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPrompts;

impl PromptRegistry for BuiltinPrompts {
    fn template(&self, key: PromptKey) -> Result<String, GenerationError> {
        Ok(key.builtin().to_string())
    }
}

/// A populated prompt pair ready for the text generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    /// Entities embedded in the prompt; recorded as the result's dependencies.
    pub dependency_entity_ids: Vec<String>,
}

/// Builds prompts for component and page entities.
pub struct PromptBuilder<'a> {
    spec: &'a Specification,
    registry: &'a dyn PromptRegistry,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(spec: &'a Specification, registry: &'a dyn PromptRegistry) -> Self {
        Self { spec, registry }
    }

    /// Build the prompt for the page-category entity `entity_id`.
    ///
    /// Components embed their referenced components. Pages embed referenced
    /// components and contexts. Any other entity kind is rejected.
    pub fn build(&self, entity_id: &str) -> Result<Prompt, GenerationError> {
        let page = self.resolve(entity_id)?;
        let system = self.registry.template(PromptKey::System)?;
        let components = self.spec.referenced_components(page);
        let component_views: Vec<_> = components.iter().map(|c| page_view(c)).collect();
        let style_guide = to_json(&self.spec.active_style_guide().map(style_view))?;

        match page.kind {
            PageKind::Component => {
                let vars = HashMap::from([
                    ("componentSpec", to_json(&page_view(page))?),
                    ("styleGuide", style_guide),
                    ("referencedComponents", to_json(&component_views)?),
                ]);
                Ok(Prompt {
                    system,
                    user: populate(&self.registry.template(PromptKey::Component)?, &vars)?,
                    dependency_entity_ids: components.iter().map(|c| c.id.clone()).collect(),
                })
            }
            PageKind::Page => {
                let contexts = self.spec.referenced_contexts(page);
                let context_views: Vec<_> = contexts.iter().map(|c| context_view(c)).collect();
                let vars = HashMap::from([
                    ("pageSpec", to_json(&page_view(page))?),
                    ("styleGuide", style_guide),
                    ("referencedComponents", to_json(&component_views)?),
                    ("referencedContexts", to_json(&context_views)?),
                ]);
                Ok(Prompt {
                    system,
                    user: populate(&self.registry.template(PromptKey::Page)?, &vars)?,
                    dependency_entity_ids: components
                        .iter()
                        .map(|c| c.id.clone())
                        .chain(contexts.iter().map(|c| c.id.clone()))
                        .collect(),
                })
            }
            _ => Err(GenerationError::UnsupportedEntity {
                id: page.id.clone(),
                kind: page.kind.as_str().to_string(),
            }),
        }
    }

    fn resolve(&self, entity_id: &str) -> Result<&'a Page, GenerationError> {
        if let Some(page) = self.spec.page(entity_id) {
            return Ok(page);
        }
        match self.spec.find_entity(entity_id) {
            Some(entity) => Err(GenerationError::UnsupportedEntity {
                id: entity_id.to_string(),
                kind: format!("{:?}", entity.category()).to_lowercase(),
            }),
            None => Err(GenerationError::NotFound(format!("entity {entity_id}"))),
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, GenerationError> {
    serde_json::to_string_pretty(value).map_err(|e| GenerationError::Prompt(e.to_string()))
}

/// Replace placeholders in a template
///
/// Supports:
/// - Mandatory: {{name}}
/// - Optional: {{name?}} (removed when no value is known)
///
/// An unknown mandatory placeholder is an error.
pub fn populate(template: &str, vars: &HashMap<&str, String>) -> Result<String, GenerationError> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start..].find("}}") else {
            break;
        };
        let end = start + end;
        let placeholder = rest[start + 2..end].trim();
        let (name, optional) = match placeholder.strip_suffix('?') {
            Some(name) => (name, true),
            None => (placeholder, false),
        };

        result.push_str(&rest[..start]);
        match vars.get(name) {
            Some(value) => result.push_str(value),
            None if optional => {}
            None => {
                return Err(GenerationError::Prompt(format!(
                    "unknown placeholder '{name}'"
                )));
            }
        }
        rest = &rest[end + 2..];
    }
    result.push_str(rest);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> Specification {
        serde_json::from_value(json!({
            "styles": [{ "id": "s1", "name": "Brand" }],
            "pages": [
                { "id": "btn", "name": "Button", "type": "component", "mainPrompt": "A button", "referenceIds": ["card"] },
                { "id": "card", "name": "Card", "type": "component" },
                { "id": "home", "name": "Home", "type": "page", "mainPrompt": "Landing",
                  "referenceIds": ["btn", "tone", "logo"] },
                { "id": "dir", "name": "Folder", "type": "folder" }
            ],
            "contexts": [{ "id": "tone", "name": "Tone", "content": "friendly" }],
            "assets": [{ "id": "logo", "link": "logo.png" }]
        }))
        .unwrap()
    }

    struct FixedPrompts(&'static str);

    impl PromptRegistry for FixedPrompts {
        fn template(&self, key: PromptKey) -> Result<String, GenerationError> {
            match key {
                PromptKey::System => Ok("sys".to_string()),
                _ => Ok(self.0.to_string()),
            }
        }
    }

    #[test]
    fn test_placeholder_replacement_mandatory() {
        let vars = HashMap::from([("name", "Alice".to_string()), ("value", "100".to_string())]);
        let result = populate("Hello {{name}}, your value is {{ value }}!", &vars).unwrap();
        assert_eq!(result, "Hello Alice, your value is 100!");
    }

    #[test]
    fn test_placeholder_replacement_optional_missing() {
        let vars = HashMap::new();
        assert_eq!(populate("Age: {{age?}}", &vars).unwrap(), "Age: ");
    }

    #[test]
    fn test_placeholder_replacement_unknown() {
        let vars = HashMap::new();
        match populate("Missing: {{missing_field}}", &vars) {
            Err(GenerationError::Prompt(message)) => assert!(message.contains("missing_field")),
            other => panic!("expected prompt error, got {other:?}"),
        }
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let vars = HashMap::from([("a", "{{b}}".to_string())]);
        assert_eq!(populate("{{a}}", &vars).unwrap(), "{{b}}");
    }

    #[test]
    fn component_prompt_embeds_referenced_components() {
        let spec = spec();
        let prompt = PromptBuilder::new(&spec, &BuiltinPrompts).build("btn").unwrap();

        assert_eq!(prompt.system, SYSTEM_PROMPT);
        assert!(prompt.user.contains("A button"));
        assert!(prompt.user.contains("\"Card\""));
        assert!(prompt.user.contains("\"Brand\""));
        assert_eq!(prompt.dependency_entity_ids, vec!["card".to_string()]);
    }

    #[test]
    fn page_prompt_embeds_components_and_contexts() {
        let spec = spec();
        let prompt = PromptBuilder::new(&spec, &BuiltinPrompts).build("home").unwrap();

        assert!(prompt.user.contains("friendly"));
        assert!(prompt.user.contains("\"Button\""));
        assert_eq!(
            prompt.dependency_entity_ids,
            vec!["btn".to_string(), "tone".to_string()]
        );
    }

    #[test]
    fn rejects_unsupported_and_missing_entities() {
        let spec = spec();
        let builder = PromptBuilder::new(&spec, &BuiltinPrompts);

        assert!(matches!(
            builder.build("dir"),
            Err(GenerationError::UnsupportedEntity { .. })
        ));
        assert!(matches!(
            builder.build("tone"),
            Err(GenerationError::UnsupportedEntity { .. })
        ));
        assert!(matches!(builder.build("nope"), Err(GenerationError::NotFound(_))));
    }

    #[test]
    fn prompts_leave_out_history_and_timestamps() {
        let spec: Specification = serde_json::from_value(json!({
            "styles": [{
                "id": "s1", "name": "Brand",
                "previousStates": [{ "name": "OLD_STYLE" }], "currentStateIndex": 0,
                "updatedAt": "2025-05-05T10:00:00Z"
            }],
            "pages": [
                { "id": "card", "name": "Card", "type": "component",
                  "previousStates": [{ "mainPrompt": "OLD_CARD" }] },
                { "id": "home", "name": "Home", "type": "page", "mainPrompt": "Landing",
                  "referenceIds": ["card", "tone"],
                  "previousStates": [{ "mainPrompt": "OLD_SNAPSHOT" }], "currentStateIndex": 0,
                  "createdAt": "2025-05-01T10:00:00Z", "updatedAt": "2025-05-05T10:00:00Z" }
            ],
            "contexts": [{ "id": "tone", "content": "friendly",
                           "previousStates": [{ "content": "OLD_TONE" }] }]
        }))
        .unwrap();

        let prompt = PromptBuilder::new(&spec, &BuiltinPrompts).build("home").unwrap();

        assert!(prompt.user.contains("Landing"));
        assert!(prompt.user.contains("friendly"));
        for leaked in [
            "previousStates",
            "currentStateIndex",
            "updatedAt",
            "createdAt",
            "OLD_SNAPSHOT",
            "OLD_STYLE",
            "OLD_CARD",
            "OLD_TONE",
        ] {
            assert!(!prompt.user.contains(leaked), "prompt leaks {leaked}");
        }
    }

    #[test]
    fn custom_template_with_unknown_placeholder_fails() {
        let spec = spec();
        let registry = FixedPrompts("{{pageSpec}} {{nonsense}}");
        assert!(matches!(
            PromptBuilder::new(&spec, &registry).build("home"),
            Err(GenerationError::Prompt(_))
        ));
    }
}
