//! Template schema parsing and validation.
//!
//! A schema arrives as JSON, either `{"label", "description", "fields"}` or a
//! bare array of field descriptors. Parsing normalises type aliases, fills in
//! labels and limits, and collects every violation before failing.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TemplateError;
use super::clean::coerce;
use super::generator::model_column;

/// Maximum identifier length for template and field names.
pub const MAX_NAME_LENGTH: usize = 64;

/// `max_length` applied to `char` fields that do not set one.
pub const DEFAULT_CHAR_MAX_LENGTH: u32 = 255;

const MAX_LENGTH_LIMIT: u32 = 10_000;

/// Entry attributes a template field may not shadow.
pub const RESERVED_NAMES: &[&str] = &[
    "id",
    "url",
    "title",
    "data",
    "author",
    "create_date",
    "last_modified",
    "policy",
    "is_active",
    "template",
    "fields",
];

#[allow(clippy::expect_used)]
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex literal"));

/// Check a template or field machine name.
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name is required".to_string());
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(format!(
            "'{name}' is longer than {MAX_NAME_LENGTH} characters"
        ));
    }
    if !IDENTIFIER.is_match(name) {
        return Err(format!(
            "'{name}' must start with a lowercase letter and contain only lowercase letters, digits and underscores"
        ));
    }
    Ok(())
}

/// Field value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Char,
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Email,
    Url,
    Choice,
}

impl FieldKind {
    pub fn code(self) -> &'static str {
        match self {
            FieldKind::Char => "char",
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::DateTime => "datetime",
            FieldKind::Email => "email",
            FieldKind::Url => "url",
            FieldKind::Choice => "choice",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Float)
    }

    /// Whether `max_length` applies.
    pub fn is_textual(self) -> bool {
        matches!(
            self,
            FieldKind::Char | FieldKind::Text | FieldKind::Email | FieldKind::Url
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "char" | "charfield" | "string" => FieldKind::Char,
            "text" | "textfield" => FieldKind::Text,
            "integer" | "integerfield" | "int" => FieldKind::Integer,
            "float" | "floatfield" => FieldKind::Float,
            "boolean" | "booleanfield" | "bool" => FieldKind::Boolean,
            "date" | "datefield" => FieldKind::Date,
            "datetime" | "datetimefield" => FieldKind::DateTime,
            "email" | "emailfield" => FieldKind::Email,
            "url" | "urlfield" => FieldKind::Url,
            "choice" | "choicefield" => FieldKind::Choice,
            _ => return Err(format!("unknown field type '{s}'")),
        };
        Ok(kind)
    }
}

/// One allowed value of a `choice` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub value: String,
    pub label: String,
}

/// Normalised field descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ChoiceOption>,
}

/// Normalised template schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSchema {
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub fields: Vec<FieldDescriptor>,
}

impl TemplateSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSchema {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    fields: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    required: Option<bool>,
    #[serde(default)]
    help_text: Option<String>,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    max_length: Option<i64>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default)]
    choices: Option<Vec<RawChoice>>,
}

/// `"a"`, `["a", "A"]` or `{"value": "a", "label": "A"}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawChoice {
    Value(String),
    Pair(String, String),
    Full { value: String, label: Option<String> },
}

impl From<RawChoice> for ChoiceOption {
    fn from(raw: RawChoice) -> Self {
        match raw {
            RawChoice::Value(value) => ChoiceOption {
                label: value.clone(),
                value,
            },
            RawChoice::Pair(value, label) => ChoiceOption { value, label },
            RawChoice::Full { value, label } => ChoiceOption {
                label: label.unwrap_or_else(|| value.clone()),
                value,
            },
        }
    }
}

/// `"publish_date"` becomes `"Publish date"`.
pub fn humanize(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Parse and validate a schema for the template `name`.
pub fn parse_schema(name: &str, input: &Value) -> Result<TemplateSchema, TemplateError> {
    let mut errors = Vec::new();
    if let Err(e) = validate_identifier(name) {
        errors.push(format!("template {e}"));
    }

    let raw = match input {
        Value::Array(fields) => RawSchema {
            label: None,
            description: None,
            fields: fields.clone(),
        },
        Value::Object(_) => serde_json::from_value::<RawSchema>(input.clone())
            .map_err(|e| TemplateError::Invalid(vec![format!("schema: {e}")]))?,
        _ => {
            return Err(TemplateError::Invalid(vec![
                "schema must be an object or an array of fields".to_string(),
            ]));
        }
    };

    if raw.fields.is_empty() {
        errors.push("schema must define at least one field".to_string());
    }

    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(raw.fields.len());
    for (index, value) in raw.fields.into_iter().enumerate() {
        match serde_json::from_value::<RawField>(value) {
            Ok(field) => {
                if let Some(descriptor) = normalize_field(index, field, &mut errors) {
                    if !seen.insert(descriptor.name.clone()) {
                        errors.push(format!("field '{}': duplicate name", descriptor.name));
                    }
                    fields.push(descriptor);
                }
            }
            Err(e) => errors.push(format!("field #{}: {e}", index + 1)),
        }
    }

    if !errors.is_empty() {
        return Err(TemplateError::Invalid(errors));
    }

    Ok(TemplateSchema {
        label: raw
            .label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| humanize(name)),
        description: raw.description.unwrap_or_default().trim().to_string(),
        fields,
    })
}

fn normalize_field(
    index: usize,
    raw: RawField,
    errors: &mut Vec<String>,
) -> Option<FieldDescriptor> {
    let Some(name) = raw.name.map(|n| n.trim().to_string()) else {
        errors.push(format!("field #{}: name is required", index + 1));
        return None;
    };
    let before = errors.len();
    let mut fail = |message: String| errors.push(format!("field '{name}': {message}"));

    if let Err(e) = validate_identifier(&name) {
        fail(e);
    } else if RESERVED_NAMES.contains(&name.as_str()) {
        fail("name is reserved".to_string());
    }

    let kind = match raw.kind.as_deref().map(str::parse::<FieldKind>) {
        Some(Ok(kind)) => Some(kind),
        Some(Err(e)) => {
            fail(e);
            None
        }
        None => {
            fail("type is required".to_string());
            None
        }
    };

    let mut max_length = None;
    let mut choices = Vec::new();
    if let Some(kind) = kind {
        match raw.max_length {
            Some(n) if !kind.is_textual() => {
                fail(format!("max_length is not allowed for {kind} fields (got {n})"));
            }
            Some(n) if !(1..=i64::from(MAX_LENGTH_LIMIT)).contains(&n) => {
                fail(format!("max_length must be between 1 and {MAX_LENGTH_LIMIT}"));
            }
            Some(n) => max_length = u32::try_from(n).ok(),
            None if kind == FieldKind::Char => max_length = Some(DEFAULT_CHAR_MAX_LENGTH),
            None => {}
        }

        if !kind.is_numeric() && (raw.min.is_some() || raw.max.is_some()) {
            fail(format!("min/max are not allowed for {kind} fields"));
        }
        if let (Some(min), Some(max)) = (raw.min, raw.max)
            && min > max
        {
            fail("min must not be greater than max".to_string());
        }
        if kind == FieldKind::Integer
            && [raw.min, raw.max].into_iter().flatten().any(|v| v.fract() != 0.0)
        {
            fail("min/max must be whole numbers for integer fields".to_string());
        }

        match raw.choices {
            Some(list) if kind == FieldKind::Choice => {
                choices = list.into_iter().map(ChoiceOption::from).collect();
                if choices.is_empty() {
                    fail("choices must not be empty".to_string());
                }
            }
            Some(_) => fail(format!("choices are not allowed for {kind} fields")),
            None if kind == FieldKind::Choice => fail("choices are required".to_string()),
            None => {}
        }
    }

    if errors.len() > before {
        return None;
    }
    let kind = kind?;

    let mut descriptor = FieldDescriptor {
        label: raw
            .label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| humanize(&name)),
        name,
        kind,
        required: raw.required.unwrap_or(false),
        help_text: raw.help_text.filter(|h| !h.trim().is_empty()),
        default: None,
        max_length,
        min: raw.min,
        max: raw.max,
        choices,
    };

    if let Some(default) = raw.default.filter(|d| !d.is_null()) {
        match coerce(&model_column(&descriptor), &default) {
            Ok(value) => descriptor.default = Some(value),
            Err(e) => {
                errors.push(format!("field '{}': invalid default: {e}", descriptor.name));
                return None;
            }
        }
    }

    Some(descriptor)
}
