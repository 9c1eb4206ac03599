//! Rendering of entry bodies to HTML.
//!
//! Bodies are markdown by default. A template may ask for `plain_text`, in
//! which case nothing the author typed is interpreted as markup.

use std::str::FromStr;

use pulldown_cmark::{Options, Parser, html};

use crate::routes::helpers::html_escape;

/// Markup language of an entry body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyFormat {
    #[default]
    Markdown,
    PlainText,
}

impl FromStr for BodyFormat {
    type Err = std::convert::Infallible;

    /// Unrecognised names render as plain text, never as raw HTML.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "markdown" => Self::Markdown,
            _ => Self::PlainText,
        })
    }
}

/// One transformation applied to a body on its way to HTML.
pub trait RenderStep: Send + Sync {
    fn label(&self) -> &'static str;

    fn apply(&self, input: &str) -> String;
}

/// Ordered list of render steps for one body format.
pub struct BodyRenderer {
    steps: Vec<Box<dyn RenderStep>>,
}

impl BodyRenderer {
    pub fn for_format(format: BodyFormat) -> Self {
        let steps: Vec<Box<dyn RenderStep>> = match format {
            BodyFormat::Markdown => vec![Box::new(Markdown), Box::new(Sanitize)],
            BodyFormat::PlainText => vec![Box::new(Escape), Box::new(LineBreaks)],
        };
        Self { steps }
    }

    /// Shorthand for rendering once by format name.
    pub fn render_as(format: &str, body: &str) -> String {
        let format = format.parse().unwrap_or_default();
        Self::for_format(format).render(body)
    }

    pub fn render(&self, body: &str) -> String {
        let mut out = body.to_owned();
        for step in &self.steps {
            out = step.apply(&out);
        }
        out
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.label()).collect()
    }
}

impl Default for BodyRenderer {
    fn default() -> Self {
        Self::for_format(BodyFormat::default())
    }
}

struct Escape;

impl RenderStep for Escape {
    fn label(&self) -> &'static str {
        "escape"
    }

    fn apply(&self, input: &str) -> String {
        html_escape(input)
    }
}

struct LineBreaks;

impl RenderStep for LineBreaks {
    fn label(&self) -> &'static str {
        "line_breaks"
    }

    fn apply(&self, input: &str) -> String {
        input.replace('\n', "<br>\n")
    }
}

/// CommonMark plus tables, strikethrough and task lists.
struct Markdown;

impl RenderStep for Markdown {
    fn label(&self) -> &'static str {
        "markdown"
    }

    fn apply(&self, input: &str) -> String {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS;
        let mut out = String::with_capacity(input.len() * 3 / 2);
        html::push_html(&mut out, Parser::new_ext(input, options));
        out
    }
}

/// Markdown passes raw HTML through, so its output is cleaned afterwards.
struct Sanitize;

impl RenderStep for Sanitize {
    fn label(&self) -> &'static str {
        "sanitize"
    }

    fn apply(&self, input: &str) -> String {
        ammonia::Builder::default()
            .link_rel(Some("noopener noreferrer"))
            .clean(input)
            .to_string()
    }
}
