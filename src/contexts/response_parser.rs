//! Extracts file blocks from a text-generation response.
//!
//! Grammar, line oriented:
//!
//! ```text
//! open   := "```" [lang] ws 'file="' path '"' [anything]
//! close  := "```" (nothing else on the line but whitespace)
//! other  := any line
//! ```
//!
//! Outside a block, an `open` line starts a file block and any other fence
//! line starts an anonymous block whose contents are skipped. Inside a block
//! only a `close` line ends it, so fences that carry a language or a path are
//! kept as content. A block still open at the end of the text is dropped.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use crate::data::{FileKind, GeneratedFile, Page, PageKind};

fn open_fence() -> Option<&'static Regex> {
    static OPEN: OnceLock<Option<Regex>> = OnceLock::new();
    OPEN.get_or_init(|| Regex::new(r#"^```[\w.+-]*\s+file="([^"]+)""#).ok())
        .as_ref()
}

enum State {
    Outside,
    File { path: String, lines: Vec<String> },
    Anonymous,
}

/// Parse every `file="..."` block out of `text`.
///
/// A path seen twice keeps the position of its first block and the content of
/// its last. With no file blocks at all, the whole trimmed response becomes a
/// single file at [`default_path`] for `page`.
pub fn parse_response(text: &str, page: &Page) -> Vec<GeneratedFile> {
    let mut files: Vec<GeneratedFile> = Vec::new();
    let mut state = State::Outside;

    for line in text.lines() {
        let trimmed = line.trim();
        state = match state {
            State::Outside => {
                if let Some(captures) = open_fence().and_then(|re| re.captures(trimmed)) {
                    State::File {
                        path: captures[1].trim().to_string(),
                        lines: Vec::new(),
                    }
                } else if trimmed.starts_with("```") {
                    State::Anonymous
                } else {
                    State::Outside
                }
            }
            State::File { path, mut lines } => {
                if trimmed == "```" {
                    push_file(&mut files, path, lines.join("\n").trim().to_string());
                    State::Outside
                } else {
                    lines.push(line.to_string());
                    State::File { path, lines }
                }
            }
            State::Anonymous => {
                if trimmed == "```" {
                    State::Outside
                } else {
                    State::Anonymous
                }
            }
        };
    }

    if let State::File { path, .. } = state {
        debug!(path, "dropping unterminated file block");
    }

    if files.is_empty() {
        let path = default_path(page);
        files.push(GeneratedFile {
            kind: FileKind::from_path(&path),
            path,
            content: text.trim().to_string(),
        });
    }

    debug!(entity = %page.id, files = files.len(), "parsed generated code");
    files
}

fn push_file(files: &mut Vec<GeneratedFile>, path: String, content: String) {
    if path.is_empty() {
        return;
    }
    if let Some(existing) = files.iter_mut().find(|f| f.path == path) {
        existing.content = content;
        return;
    }
    files.push(GeneratedFile {
        kind: FileKind::from_path(&path),
        path,
        content,
    });
}

/// Fallback location for a response without file blocks.
///
/// Pages land at `app{route}/page.tsx` (route defaults to `/{slug}`),
/// everything else at `components/{slug}.tsx`.
pub fn default_path(page: &Page) -> String {
    let slug = match slugify(&page.name) {
        s if s.is_empty() => slugify(&page.id),
        s => s,
    };

    match page.kind {
        PageKind::Page => {
            let route = page
                .route
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(|r| r.trim_end_matches('/').to_string())
                .unwrap_or_else(|| format!("/{slug}"));
            if route.is_empty() {
                "app/page.tsx".to_string()
            } else if route.starts_with('/') {
                format!("app{route}/page.tsx")
            } else {
                format!("app/{route}/page.tsx")
            }
        }
        _ => format!("components/{slug}.tsx"),
    }
}

/// Lowercase, whitespace runs become single dashes.
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(value: serde_json::Value) -> Page {
        serde_json::from_value(value).unwrap()
    }

    fn home() -> Page {
        page(json!({ "id": "p1", "name": "Home Page", "type": "page", "route": "/home" }))
    }

    #[test]
    fn extracts_annotated_blocks() {
        let text = r#"Here you go:

```tsx file="app/home/page.tsx"
export default function Home() {
  return <main />
}
```

```ts file="lib/format.ts"
export const f = 1
```
"#;
        let files = parse_response(text, &home());

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "app/home/page.tsx");
        assert_eq!(files[0].kind, FileKind::Page);
        assert!(files[0].content.starts_with("export default function Home()"));
        assert!(files[0].content.ends_with('}'));
        assert_eq!(files[1].kind, FileKind::Utility);
    }

    #[test]
    fn anonymous_blocks_are_skipped() {
        let text = "```bash\nnpm install\n```\n```css file=\"app/extra.css\"\nbody {}\n```";
        let files = parse_response(text, &home());

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "app/extra.css");
        assert_eq!(files[0].kind, FileKind::Style);
    }

    #[test]
    fn inner_fences_stay_in_content() {
        let text = "```md file=\"docs/readme.md\"\n# Title\n```ts\nlet x = 1\n```\n";
        let files = parse_response(text, &home());

        // the bare fence closes the block; the tagged one is content
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content, "# Title\n```ts\nlet x = 1");
    }

    #[test]
    fn duplicate_paths_keep_last_content() {
        let text = "```tsx file=\"a.tsx\"\none\n```\n```tsx file=\"b.tsx\"\nb\n```\n```tsx file=\"a.tsx\"\ntwo\n```";
        let files = parse_response(text, &home());

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.tsx", "b.tsx"]);
        assert_eq!(files[0].content, "two");
    }

    #[test]
    fn unterminated_block_falls_back_to_whole_text() {
        let text = "```tsx file=\"a.tsx\"\nconst a = 1";
        let files = parse_response(text, &home());

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "app/home/page.tsx");
        assert_eq!(files[0].content, text);
    }

    #[test]
    fn default_paths_follow_entity_kind() {
        assert_eq!(default_path(&home()), "app/home/page.tsx");
        assert_eq!(
            default_path(&page(json!({ "id": "p", "name": "About Us", "type": "page" }))),
            "app/about-us/page.tsx"
        );
        assert_eq!(
            default_path(&page(json!({ "id": "p", "name": "Root", "type": "page", "route": "/" }))),
            "app/page.tsx"
        );
        assert_eq!(
            default_path(&page(json!({ "id": "c", "name": "Primary  Button", "type": "component" }))),
            "components/primary-button.tsx"
        );
        assert_eq!(
            default_path(&page(json!({ "id": "c9", "type": "component" }))),
            "components/c9.tsx"
        );
    }

    #[test]
    fn plain_response_uses_default_path() {
        let files = parse_response("  export const Button = () => null\n", &page(json!({
            "id": "c1", "name": "Button", "type": "component"
        })));

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "components/button.tsx");
        assert_eq!(files[0].kind, FileKind::Component);
        assert_eq!(files[0].content, "export const Button = () => null");
    }
}
