//! Blogging test utilities.
//!
//! Fixture builders for entry and template payloads, test accounts, and
//! assertion helpers for HTML and JSON responses.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value as JsonValue, json};
use uuid::Uuid;

/// Start building an entry payload.
pub fn test_entry(title: &str, data: &str) -> TestEntry {
    TestEntry {
        title: Some(title.to_string()),
        data: Some(data.to_string()),
        template: None,
        fields: None,
        policies: Vec::new(),
        is_active: None,
    }
}

/// An entry payload builder for the REST API.
#[derive(Debug, Clone, Default)]
pub struct TestEntry {
    pub title: Option<String>,
    pub data: Option<String>,
    pub template: Option<String>,
    pub fields: Option<JsonValue>,
    pub policies: Vec<JsonValue>,
    pub is_active: Option<bool>,
}

impl TestEntry {
    /// Leave the title out of the payload.
    pub fn without_title(mut self) -> Self {
        self.title = None;
        self
    }

    /// Leave the body out of the payload.
    pub fn without_data(mut self) -> Self {
        self.data = None;
        self
    }

    /// Use a content template.
    pub fn with_template(mut self, name: &str) -> Self {
        self.template = Some(name.to_string());
        self
    }

    /// Set template field values.
    pub fn with_fields(mut self, fields: JsonValue) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Set one template field value.
    pub fn with_field(mut self, name: &str, value: JsonValue) -> Self {
        let fields = self.fields.get_or_insert_with(|| json!({}));
        if let Some(obj) = fields.as_object_mut() {
            obj.insert(name.to_string(), value);
        }
        self
    }

    /// Publish from an hour ago, open-ended.
    pub fn published(self) -> Self {
        self.with_policy("PUB", Some(hours_from_now(-1)), None)
    }

    /// Publish starting in the future.
    pub fn scheduled(self, hours: i64) -> Self {
        self.with_policy("PUB", Some(hours_from_now(hours)), None)
    }

    /// Pin from an hour ago, open-ended.
    pub fn pinned(self) -> Self {
        self.with_policy("PIN", Some(hours_from_now(-1)), None)
    }

    /// Attach a policy with an explicit window.
    pub fn with_policy(
        mut self,
        kind: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.policies.push(json!({
            "policy": kind,
            "start": start,
            "end": end,
        }));
        self
    }

    /// Set the `is_active` flag used when policies are disabled.
    pub fn active(mut self, active: bool) -> Self {
        self.is_active = Some(active);
        self
    }

    /// Body for `/blogging/api/content/`.
    pub fn content_json(&self) -> JsonValue {
        let mut body = Map::new();
        if let Some(title) = &self.title {
            body.insert("title".to_string(), json!(title));
        }
        if let Some(data) = &self.data {
            body.insert("data".to_string(), json!(data));
        }
        if let Some(template) = &self.template {
            body.insert("template".to_string(), json!(template));
        }
        if let Some(fields) = &self.fields {
            body.insert("fields".to_string(), fields.clone());
        }
        JsonValue::Object(body)
    }

    /// Body for `/blogging/api/manage/`, with nested policies.
    pub fn manage_json(&self) -> JsonValue {
        let mut body = self.content_json();
        if let Some(obj) = body.as_object_mut() {
            if !self.policies.is_empty() {
                obj.insert("policy".to_string(), JsonValue::Array(self.policies.clone()));
            }
            if let Some(active) = self.is_active {
                obj.insert("is_active".to_string(), json!(active));
            }
        }
        body
    }

    /// Fields of the HTML edit form, without the CSRF token or action.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("title".to_string(), self.title.clone().unwrap_or_default()),
            ("data".to_string(), self.data.clone().unwrap_or_default()),
        ];
        if let Some(template) = &self.template {
            fields.push(("template".to_string(), template.clone()));
        }
        if let Some(JsonValue::Object(values)) = &self.fields {
            for (name, value) in values {
                let text = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                fields.push((name.clone(), text));
            }
        }
        fields
    }
}

/// `now` shifted by whole hours.
pub fn hours_from_now(hours: i64) -> DateTime<Utc> {
    Utc::now() + Duration::hours(hours)
}

/// Create a regular test account.
pub fn test_user(name: &str) -> TestUser {
    TestUser {
        name: name.to_string(),
        mail: format!("{name}@example.com"),
        password: format!("{name}-password"),
        is_admin: false,
    }
}

/// Create an administrator test account.
pub fn admin_user(name: &str) -> TestUser {
    TestUser {
        is_admin: true,
        ..test_user(name)
    }
}

/// Credentials for an account the test will create.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub name: String,
    pub mail: String,
    pub password: String,
    pub is_admin: bool,
}

impl TestUser {
    /// Body for `/user/login/json`.
    pub fn login_json(&self) -> JsonValue {
        json!({"username": self.name, "password": self.password})
    }
}

/// A random UUID that matches no stored user.
pub fn unknown_user_id() -> Uuid {
    Uuid::now_v7()
}

/// Assertion helpers for response bodies.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON value lacks a specific key.
    pub fn lacks_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_none(),
            "Expected JSON to lack key '{key}', got: {value}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that `needle` occurs exactly `count` times.
    pub fn contains_count(haystack: &str, needle: &str, count: usize) {
        let found = haystack.matches(needle).count();
        assert_eq!(
            found, count,
            "Expected '{needle}' {count} time(s), found {found}\nActual: {haystack}"
        );
    }
}

/// Template schema payloads.
pub mod schemas {
    use serde_json::{Value, json};

    /// A recipe template with numeric, choice and text fields.
    pub fn recipe() -> Value {
        json!({
            "label": "Recipe",
            "description": "Ingredients and servings",
            "fields": [
                {"name": "servings", "type": "integer", "required": true, "min": 1, "max": 50},
                {"name": "difficulty", "type": "choice", "choices": [["easy", "Easy"], ["hard", "Hard"]]},
                {"name": "ingredients", "type": "text", "help_text": "One per line"}
            ]
        })
    }

    /// An event template with a date and a flag.
    pub fn event() -> Value {
        json!([
            {"name": "venue", "type": "string", "max_length": 80, "required": true},
            {"name": "starts_on", "type": "date"},
            {"name": "free_entry", "type": "boolean", "default": true}
        ])
    }
}
