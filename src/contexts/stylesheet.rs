use std::fmt::Write;

use crate::data::{ColorPalette, Specification, StyleGuide, ThemeMode};

use super::response_parser::slugify;

pub const GLOBAL_STYLESHEET: &str = "app/globals.css";

/// Where a style guide's stylesheet is written. The active (first) style guide
/// owns `app/globals.css`; the others get `styles/{slug}.css`.
pub fn stylesheet_path(spec: &Specification, style: &StyleGuide) -> String {
    let is_active = spec.active_style_guide().is_some_and(|active| active.id == style.id);
    if is_active {
        return GLOBAL_STYLESHEET.to_string();
    }
    let slug = match slugify(&style.name) {
        s if s.is_empty() => slugify(&style.id),
        s => s,
    };
    format!("styles/{slug}.css")
}

/// Render a style guide as CSS custom properties followed by base rules.
///
/// Deterministic: the same style guide always renders the same text.
pub fn render_stylesheet(style: &StyleGuide) -> String {
    let mut css = String::from("@import 'tailwindcss';\n\n@theme inline {\n");

    css.push_str("  /* Colors */\n");
    push_palette(&mut css, style.active_palette());
    for custom in &style.colors.custom {
        let name = slugify(&custom.name);
        if !name.is_empty() && !custom.value.is_empty() {
            let _ = writeln!(css, "  --color-{name}: {};", custom.value);
        }
    }

    css.push_str("\n  /* Typography */\n");
    for (property, font) in [
        ("--font-heading", &style.typography.heading),
        ("--font-sans", &style.typography.body),
        ("--font-mono", &style.typography.code),
    ] {
        if !font.is_empty() {
            let _ = writeln!(css, "  {property}: {font};");
        }
    }

    css.push_str("\n  /* Spacing */\n");
    let _ = writeln!(css, "  --spacing: {}px;", style.spacing);

    css.push_str("\n  /* Effects */\n");
    let _ = writeln!(css, "  --radius: {}px;", style.border_radius);
    css.push_str("}\n");

    // the inactive palette is still reachable through the .dark/.light class
    let (class, palette) = match style.theme_mode {
        ThemeMode::Light => ("dark", &style.colors.dark),
        ThemeMode::Dark => ("light", &style.colors.light),
    };
    if !palette.entries().is_empty() {
        let _ = writeln!(css, "\n.{class} {{");
        push_palette(&mut css, palette);
        css.push_str("}\n");
    }

    css.push_str(
        "
/* Base Styles */
body {
  font-family: var(--font-sans, system-ui, sans-serif);
  color: var(--color-text, #000);
  background: var(--color-background, #fff);
}

h1, h2, h3, h4, h5, h6 {
  font-family: var(--font-heading, var(--font-sans, system-ui, sans-serif));
}
",
    );
    css
}

fn push_palette(css: &mut String, palette: &ColorPalette) {
    for (key, value) in palette.entries() {
        let _ = writeln!(css, "  --color-{key}: {value};");
    }
}
