//! Entry field cleaning against a generated model.
//!
//! Coerces raw values (form strings or JSON) to typed JSON and enforces the
//! column rules. Errors are keyed by field name.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use super::generator::{ModelColumn, ModelDefinition};
use super::schema::FieldKind;
use crate::error::FieldErrors;

const REQUIRED: &str = "This field is required.";

#[allow(clippy::expect_used)]
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex literal")
});

#[allow(clippy::expect_used)]
static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[A-Za-z0-9][^\s/?#]*(?:[/?#]\S*)?$").expect("valid regex literal")
});

impl ModelDefinition {
    /// Clean values posted from an HTML form.
    ///
    /// Empty strings count as missing. An unchecked checkbox is never
    /// submitted, so an absent boolean is `false` whatever its default.
    pub fn clean_form(&self, input: &HashMap<String, String>) -> Result<Map<String, Value>, FieldErrors> {
        let mut errors = FieldErrors::new();
        for key in input.keys() {
            if self.column(key).is_none() {
                errors.add(key, "Unknown field.");
            }
        }

        let mut cleaned = Map::new();
        for column in &self.columns {
            let raw = input
                .get(&column.name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty());
            let value = match raw {
                Some(raw) => coerce(column, &Value::String(raw.to_string())),
                None if column.kind == FieldKind::Boolean => Ok(Value::Bool(false)),
                None => missing(column),
            };
            collect(column, value, &mut cleaned, &mut errors);
        }

        errors.into_result(cleaned)
    }

    /// Clean a JSON object from an API payload. `null` counts as missing.
    pub fn clean_json(&self, input: &Value) -> Result<Map<String, Value>, FieldErrors> {
        let mut errors = FieldErrors::new();
        let empty = Map::new();
        let object = match input {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                errors.add("fields", "Expected an object.");
                return Err(errors);
            }
        };

        for key in object.keys() {
            if self.column(key).is_none() {
                errors.add(key, "Unknown field.");
            }
        }

        let mut cleaned = Map::new();
        for column in &self.columns {
            let value = match object.get(&column.name) {
                Some(Value::Null) | None => missing(column),
                Some(Value::String(s)) if s.trim().is_empty() => missing(column),
                Some(value) => coerce(column, value),
            };
            collect(column, value, &mut cleaned, &mut errors);
        }

        errors.into_result(cleaned)
    }
}

fn collect(
    column: &ModelColumn,
    value: Result<Value, String>,
    cleaned: &mut Map<String, Value>,
    errors: &mut FieldErrors,
) {
    match value {
        Ok(Value::Null) => {}
        Ok(value) => {
            cleaned.insert(column.name.clone(), value);
        }
        Err(message) => errors.add(&column.name, message),
    }
}

/// A missing value: the default, or an error when required.
fn missing(column: &ModelColumn) -> Result<Value, String> {
    match &column.default {
        Some(default) => Ok(default.clone()),
        None if !column.nullable => Err(REQUIRED.to_string()),
        None => Ok(Value::Null),
    }
}

/// Coerce one present value to the column's type and check its rules.
pub(super) fn coerce(column: &ModelColumn, value: &Value) -> Result<Value, String> {
    let value = match column.kind {
        FieldKind::Char | FieldKind::Text => Value::String(text(value)?),
        FieldKind::Email => {
            let s = text(value)?;
            if !EMAIL.is_match(&s) {
                return Err("Enter a valid email address.".to_string());
            }
            Value::String(s)
        }
        FieldKind::Url => {
            let s = text(value)?;
            if !URL.is_match(&s) {
                return Err("Enter a valid URL.".to_string());
            }
            Value::String(s)
        }
        FieldKind::Integer => {
            let n = integer(value).ok_or_else(|| "Enter a whole number.".to_string())?;
            check_range(column, n as f64)?;
            Value::from(n)
        }
        FieldKind::Float => {
            let n = float(value).ok_or_else(|| "Enter a number.".to_string())?;
            check_range(column, n)?;
            Value::from(n)
        }
        FieldKind::Boolean => Value::Bool(boolean(value).ok_or_else(|| "Enter a valid boolean.".to_string())?),
        FieldKind::Date => {
            let date = value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
                .ok_or_else(|| "Enter a valid date.".to_string())?;
            Value::String(date.format("%Y-%m-%d").to_string())
        }
        FieldKind::DateTime => {
            let dt = value
                .as_str()
                .and_then(|s| parse_datetime(s.trim()))
                .ok_or_else(|| "Enter a valid date/time.".to_string())?;
            Value::String(dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        }
        FieldKind::Choice => {
            let s = text(value)?;
            if !column.choices.iter().any(|c| *c == s) {
                return Err(format!(
                    "Select a valid choice. {s} is not one of the available choices."
                ));
            }
            Value::String(s)
        }
    };

    if let (Some(max), Value::String(s)) = (column.max_length, &value) {
        let len = s.chars().count();
        if len > max as usize {
            return Err(format!(
                "Ensure this value has at most {max} characters (it has {len})."
            ));
        }
    }

    Ok(value)
}

fn text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err("Enter a valid value.".to_string()),
    }
}

fn integer(value: &Value) -> Option<i64> {
    // `i64::MAX as f64` rounds up to 2^63, which is itself out of range.
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && (-BOUND..BOUND).contains(f))
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "1" | "yes" => Some(true),
            "false" | "off" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().and_then(|n| match n {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }),
        _ => None,
    }
}

/// RFC 3339, or a naive `datetime-local` value taken as UTC.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn check_range(column: &ModelColumn, n: f64) -> Result<(), String> {
    if let Some(min) = column.min.filter(|min| n < *min) {
        return Err(format!(
            "Ensure this value is greater than or equal to {min}."
        ));
    }
    if let Some(max) = column.max.filter(|max| n > *max) {
        return Err(format!("Ensure this value is less than or equal to {max}."));
    }
    Ok(())
}
