//! Theme engine with embedded Tera templates.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tera::Tera;
use tracing::debug;

use crate::content::BodyRenderer;

/// Templates compiled into the binary, by name.
const EMBEDDED: &[(&str, &str)] = &[
    ("base.html", include_str!("../../templates/base.html")),
    ("blogging/index.html", include_str!("../../templates/blogging/index.html")),
    ("blogging/detail.html", include_str!("../../templates/blogging/detail.html")),
    ("blogging/list.html", include_str!("../../templates/blogging/list.html")),
    ("blogging/edit.html", include_str!("../../templates/blogging/edit.html")),
    (
        "blogging/template_list.html",
        include_str!("../../templates/blogging/template_list.html"),
    ),
    (
        "blogging/template_detail.html",
        include_str!("../../templates/blogging/template_detail.html"),
    ),
    ("user/login.html", include_str!("../../templates/user/login.html")),
];

/// Theme engine for rendering templates.
pub struct ThemeEngine {
    tera: Tera,
}

impl ThemeEngine {
    /// Load the embedded templates, with optional overrides from `override_dir`.
    pub fn new(override_dir: Option<&Path>) -> Result<Self> {
        let mut embedded = Tera::default();
        embedded
            .add_raw_templates(EMBEDDED.iter().copied())
            .context("failed to compile embedded templates")?;

        let mut tera = match override_dir {
            Some(dir) => {
                let pattern = dir.join("**/*.html");
                let pattern_str = pattern
                    .to_str()
                    .context("invalid template directory path")?;
                let mut overrides =
                    Tera::new(pattern_str).context("failed to initialize Tera templates")?;
                // Templates already in `overrides` win over embedded ones.
                overrides
                    .extend(&embedded)
                    .context("failed to merge embedded templates")?;
                overrides
            }
            None => embedded,
        };

        Self::register_filters(&mut tera);

        let template_names: Vec<_> = tera.get_template_names().collect();
        debug!(count = template_names.len(), "loaded templates");

        Ok(Self { tera })
    }

    /// Register custom Tera filters.
    fn register_filters(tera: &mut Tera) {
        // Entry body rendering
        tera.register_filter(
            "text_format",
            |value: &tera::Value, args: &HashMap<String, tera::Value>| {
                let text = tera::try_get_value!("text_format", "value", String, value);
                let format = args
                    .get("format")
                    .and_then(|v| v.as_str())
                    .unwrap_or("markdown");

                Ok(tera::Value::String(BodyRenderer::render_as(format, &text)))
            },
        );

        // RFC 3339 timestamps as human-readable dates
        tera.register_filter(
            "format_datetime",
            |value: &tera::Value, args: &HashMap<String, tera::Value>| {
                let Some(raw) = value.as_str() else {
                    return Ok(tera::Value::String(String::new()));
                };
                let format = args
                    .get("format")
                    .and_then(|v| v.as_str())
                    .unwrap_or("%B %-d, %Y %H:%M");

                let formatted = chrono::DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.format(format).to_string())
                    .unwrap_or_else(|_| raw.to_string());

                Ok(tera::Value::String(formatted))
            },
        );
    }

    pub fn tera(&self) -> &Tera {
        &self.tera
    }

    /// Render a template by name.
    pub fn render(&self, template: &str, context: &tera::Context) -> Result<String> {
        self.tera
            .render(template, context)
            .with_context(|| format!("failed to render template {template}"))
    }
}

impl std::fmt::Debug for ThemeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeEngine")
            .field("templates", &self.tera.get_template_names().count())
            .finish()
    }
}
