//! HTML rendering of generated template forms.
//!
//! Renders the extra fields a content template adds to the entry edit form.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::FieldErrors;
use crate::routes::helpers::html_escape;
use crate::template::{FormDefinition, FormField, Widget};

/// Builder for template field inputs.
pub struct FormBuilder<'a> {
    form: &'a FormDefinition,
    values: HashMap<String, String>,
    errors: Option<&'a FieldErrors>,
}

impl<'a> FormBuilder<'a> {
    pub fn new(form: &'a FormDefinition) -> Self {
        Self {
            form,
            values: HashMap::new(),
            errors: None,
        }
    }

    /// Pre-fill from submitted form strings.
    pub fn with_values(mut self, values: HashMap<String, String>) -> Self {
        self.values = values;
        self
    }

    /// Pre-fill from stored entry fields.
    pub fn with_stored(mut self, fields: &Value) -> Self {
        self.values = stored_values(fields);
        self
    }

    /// Show messages recorded under `fields.<name>`.
    pub fn with_errors(mut self, errors: &'a FieldErrors) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Render every field.
    pub fn render(&self) -> String {
        self.form
            .fields
            .iter()
            .map(|field| self.render_field(field))
            .collect()
    }

    fn value_of(&self, field: &FormField) -> Option<String> {
        self.values.get(&field.name).cloned().or_else(|| {
            field.initial.as_ref().map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        })
    }

    /// Render a single field based on its widget.
    fn render_field(&self, field: &FormField) -> String {
        let name = html_escape(&field.name);
        let label = html_escape(&field.label);
        let required = if field.required { " required" } else { "" };
        let required_star = if field.required { " *" } else { "" };
        let value = self.value_of(field).unwrap_or_default();

        let input = match field.widget {
            Widget::Textarea => {
                let max = field
                    .max_length
                    .map(|m| format!(r#" maxlength="{m}""#))
                    .unwrap_or_default();
                format!(
                    r#"<textarea id="field-{name}" name="{name}" rows="4" class="form-control"{required}{max}>{}</textarea>"#,
                    html_escape(&value)
                )
            }
            Widget::Checkbox => {
                let checked = if is_truthy(&value) { " checked" } else { "" };
                format!(r#"<input type="checkbox" id="field-{name}" name="{name}" value="on"{checked}>"#)
            }
            Widget::Select => {
                let mut options = String::new();
                if !field.required {
                    options.push_str(r#"<option value="">---------</option>"#);
                }
                for choice in &field.choices {
                    let selected = if choice.value == value { " selected" } else { "" };
                    options.push_str(&format!(
                        r#"<option value="{}"{selected}>{}</option>"#,
                        html_escape(&choice.value),
                        html_escape(&choice.label)
                    ));
                }
                format!(
                    r#"<select id="field-{name}" name="{name}" class="form-control"{required}>{options}</select>"#
                )
            }
            widget => {
                let mut attrs = String::new();
                if let Some(m) = field.max_length {
                    attrs.push_str(&format!(r#" maxlength="{m}""#));
                }
                if let Some(min) = field.min {
                    attrs.push_str(&format!(r#" min="{min}""#));
                }
                if let Some(max) = field.max {
                    attrs.push_str(&format!(r#" max="{max}""#));
                }
                if widget == Widget::Number {
                    match field.step {
                        Some(step) => attrs.push_str(&format!(r#" step="{step}""#)),
                        None => attrs.push_str(r#" step="any""#),
                    }
                }
                format!(
                    r#"<input type="{}" id="field-{name}" name="{name}" value="{}" class="form-control"{required}{attrs}>"#,
                    widget.input_type(),
                    html_escape(&value)
                )
            }
        };

        let help = field
            .help_text
            .as_deref()
            .map(|h| format!(r#"<small class="form-help">{}</small>"#, html_escape(h)))
            .unwrap_or_default();
        let errors: String = self
            .errors
            .and_then(|e| e.get(&format!("fields.{}", field.name)))
            .unwrap_or_default()
            .iter()
            .map(|m| format!(r#"<p class="form-error">{}</p>"#, html_escape(m)))
            .collect();

        format!(
            r#"<div class="form-group form-group-{name}"><label for="field-{name}">{label}{required_star}</label>{input}{help}{errors}</div>"#
        )
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "on" | "true" | "1" | "yes"
    )
}

/// Stored JSON field values as form strings.
///
/// Datetimes are shown in `datetime-local` format.
pub fn stored_values(fields: &Value) -> HashMap<String, String> {
    let Value::Object(map) = fields else {
        return HashMap::new();
    };
    map.iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::Bool(b) => if *b { "on".to_string() } else { String::new() },
                Value::String(s) => match DateTime::parse_from_rfc3339(s) {
                    Ok(dt) => dt.with_timezone(&Utc).format("%Y-%m-%dT%H:%M").to_string(),
                    Err(_) => s.clone(),
                },
                other => other.to_string(),
            };
            Some((key.clone(), text))
        })
        .collect()
}
