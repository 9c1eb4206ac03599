//! Runtime content templates.
//!
//! An administrator describes extra entry fields as JSON. The generator
//! validates the description, derives a form definition and a model
//! definition from it, and persists the result as a YAML artifact. The
//! registry loads artifacts back at startup and after every change.

pub mod artifact;
mod clean;
mod generator;
mod registry;
mod schema;

use thiserror::Error;

pub use generator::{
    FormDefinition, FormField, GeneratedTemplate, ModelColumn, ModelDefinition, Widget, build,
    checksum, generate,
};
pub use registry::TemplateRegistry;
pub use schema::{
    ChoiceOption, FieldDescriptor, FieldKind, RESERVED_NAMES, TemplateSchema, humanize,
    parse_schema, validate_identifier,
};

/// Template generation and storage errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The schema or name broke one or more rules.
    #[error("invalid template: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("template encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("template artifact error: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("template artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TemplateError {
    /// Messages suitable for showing to the administrator.
    pub fn messages(&self) -> Vec<String> {
        match self {
            TemplateError::Invalid(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}
