//! Form and model synthesis from a validated schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::TemplateError;
use super::schema::{ChoiceOption, FieldDescriptor, FieldKind, TemplateSchema, parse_schema};

/// HTML input widget for a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Widget {
    Text,
    Textarea,
    Number,
    Checkbox,
    Date,
    DatetimeLocal,
    Email,
    Url,
    Select,
}

impl Widget {
    fn for_kind(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Char => Widget::Text,
            FieldKind::Text => Widget::Textarea,
            FieldKind::Integer | FieldKind::Float => Widget::Number,
            FieldKind::Boolean => Widget::Checkbox,
            FieldKind::Date => Widget::Date,
            FieldKind::DateTime => Widget::DatetimeLocal,
            FieldKind::Email => Widget::Email,
            FieldKind::Url => Widget::Url,
            FieldKind::Choice => Widget::Select,
        }
    }

    /// The `type` attribute for `<input>` widgets.
    pub fn input_type(self) -> &'static str {
        match self {
            Widget::Text | Widget::Textarea | Widget::Select => "text",
            Widget::Number => "number",
            Widget::Checkbox => "checkbox",
            Widget::Date => "date",
            Widget::DatetimeLocal => "datetime-local",
            Widget::Email => "email",
            Widget::Url => "url",
        }
    }
}

/// One field of a generated form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub widget: Widget,
    pub label: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// `None` on a number widget means any step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ChoiceOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDefinition {
    pub fields: Vec<FormField>,
}

/// One column of a generated model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelColumn {
    pub name: String,
    pub kind: FieldKind,
    /// SQL type the column maps to.
    pub column_type: String,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    /// SQL check constraints, informational.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    pub columns: Vec<ModelColumn>,
}

impl ModelDefinition {
    pub fn column(&self, name: &str) -> Option<&ModelColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A template ready to be persisted and registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTemplate {
    pub name: String,
    pub label: String,
    pub description: String,
    pub schema: TemplateSchema,
    pub form: FormDefinition,
    pub model: ModelDefinition,
    pub checksum: String,
    pub generated_at: DateTime<Utc>,
}

impl GeneratedTemplate {
    /// Whether the stored checksum still matches the schema.
    pub fn verify(&self) -> bool {
        checksum(&self.name, &self.schema).is_ok_and(|sum| sum == self.checksum)
    }
}

/// Hex SHA-256 over the canonical JSON of the name and normalised schema.
pub fn checksum(name: &str, schema: &TemplateSchema) -> Result<String, TemplateError> {
    let canonical = serde_json::to_vec(&(name, schema))?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// Validate `input` and generate the template `name` from it.
pub fn generate(name: &str, input: &Value) -> Result<GeneratedTemplate, TemplateError> {
    let schema = parse_schema(name, input)?;
    build(name, schema)
}

/// Generate from an already-normalised schema.
pub fn build(name: &str, schema: TemplateSchema) -> Result<GeneratedTemplate, TemplateError> {
    let form = FormDefinition {
        fields: schema.fields.iter().map(form_field).collect(),
    };
    let model = ModelDefinition {
        name: name.to_string(),
        columns: schema.fields.iter().map(model_column).collect(),
    };

    Ok(GeneratedTemplate {
        name: name.to_string(),
        label: schema.label.clone(),
        description: schema.description.clone(),
        checksum: checksum(name, &schema)?,
        schema,
        form,
        model,
        generated_at: Utc::now(),
    })
}

fn form_field(field: &FieldDescriptor) -> FormField {
    FormField {
        name: field.name.clone(),
        widget: Widget::for_kind(field.kind),
        label: field.label.clone(),
        required: field.required,
        help_text: field.help_text.clone(),
        max_length: field.max_length,
        min: field.min,
        max: field.max,
        step: (field.kind == FieldKind::Integer).then_some(1.0),
        choices: field.choices.clone(),
        initial: field.default.clone(),
    }
}

pub(super) fn model_column(field: &FieldDescriptor) -> ModelColumn {
    let column_type = match field.kind {
        FieldKind::Char => format!(
            "varchar({})",
            field.max_length.unwrap_or(super::schema::DEFAULT_CHAR_MAX_LENGTH)
        ),
        FieldKind::Text | FieldKind::Email | FieldKind::Url | FieldKind::Choice => {
            "text".to_string()
        }
        FieldKind::Integer => "bigint".to_string(),
        FieldKind::Float => "double precision".to_string(),
        FieldKind::Boolean => "boolean".to_string(),
        FieldKind::Date => "date".to_string(),
        FieldKind::DateTime => "timestamptz".to_string(),
    };

    let name = &field.name;
    let mut constraints = Vec::new();
    if let Some(n) = field.max_length.filter(|_| field.kind != FieldKind::Char) {
        constraints.push(format!("CHECK (char_length({name}) <= {n})"));
    }
    if let Some(min) = field.min {
        constraints.push(format!("CHECK ({name} >= {min})"));
    }
    if let Some(max) = field.max {
        constraints.push(format!("CHECK ({name} <= {max})"));
    }
    if !field.choices.is_empty() {
        let values: Vec<String> = field
            .choices
            .iter()
            .map(|c| format!("'{}'", c.value.replace('\'', "''")))
            .collect();
        constraints.push(format!("CHECK ({name} IN ({}))", values.join(", ")));
    }

    ModelColumn {
        name: field.name.clone(),
        kind: field.kind,
        column_type,
        nullable: !field.required,
        default: field.default.clone(),
        max_length: field.max_length,
        min: field.min,
        max: field.max,
        choices: field.choices.iter().map(|c| c.value.clone()).collect(),
        constraints,
    }
}
