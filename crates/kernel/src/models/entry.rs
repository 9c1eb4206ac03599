//! Entry model.
//!
//! An entry is a single blog post: a title, a body (`data`) and, when it was
//! written against a content template, a JSON object of typed extra fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum title length in characters.
pub const TITLE_MAX_LENGTH: usize = 100;

/// Characters of body text used as a heading for untitled entries.
const DISPLAY_TITLE_FALLBACK_CHARS: usize = 50;

/// Entry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Entry {
    /// Sequential identifier.
    pub id: i64,

    /// Entry title (may be empty when `data` is not).
    pub title: String,

    /// Entry body.
    pub data: String,

    /// Author user ID.
    pub author_id: Uuid,

    /// When the entry was first saved.
    pub create_date: DateTime<Utc>,

    /// When the entry was last written.
    pub last_modified: DateTime<Utc>,

    /// Publication flag, consulted only when policies are disabled.
    pub is_active: bool,

    /// Content template the entry was written against.
    pub template: Option<String>,

    /// Template field values (JSON object).
    pub fields: serde_json::Value,
}

/// Input for creating a new entry.
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub title: String,
    pub data: String,
    pub author_id: Uuid,
    pub is_active: bool,
    pub template: Option<String>,
    pub fields: serde_json::Value,
}

/// Partial update of an entry. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct EntryChanges {
    pub title: Option<String>,
    pub data: Option<String>,
    pub is_active: Option<bool>,
    pub template: Option<Option<String>>,
    pub fields: Option<serde_json::Value>,
}

impl EntryChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.data.is_none()
            && self.is_active.is_none()
            && self.template.is_none()
            && self.fields.is_none()
    }

    /// Apply these changes to an entry in place, stamping `last_modified`.
    pub fn apply_to(&self, entry: &mut Entry, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            entry.title.clone_from(title);
        }
        if let Some(data) = &self.data {
            entry.data.clone_from(data);
        }
        if let Some(is_active) = self.is_active {
            entry.is_active = is_active;
        }
        if let Some(template) = &self.template {
            entry.template.clone_from(template);
        }
        if let Some(fields) = &self.fields {
            entry.fields = fields.clone();
        }
        entry.last_modified = now;
    }
}

impl Entry {
    /// Heading shown for the entry: its title, or the start of the body
    /// when untitled.
    pub fn display_title(&self) -> String {
        let title = self.title.trim();
        if !title.is_empty() {
            return title.to_string();
        }

        let body = self.data.trim();
        let mut chars = body.chars();
        let head: String = chars.by_ref().take(DISPLAY_TITLE_FALLBACK_CHARS).collect();
        if chars.next().is_some() {
            format!("{head}…")
        } else {
            head
        }
    }

    pub fn is_authored_by(&self, user_id: Uuid) -> bool {
        self.author_id == user_id
    }
}
