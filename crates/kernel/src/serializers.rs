//! JSON representations for the REST API.
//!
//! Read shapes carry absolute hyperlinks built from the configured site URL.
//! Write shapes keep every field optional; `template`, `start` and `end`
//! distinguish "absent" from an explicit `null`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::content::{EntryDraft, EntryView, FieldInput};
use crate::error::FieldErrors;
use crate::models::{Entry, Policy, PolicyInput, PolicyKind, User};
use crate::template::GeneratedTemplate;

/// API mount point.
pub const API_PREFIX: &str = "/blogging/api";

/// Message for a missing required field.
pub const REQUIRED: &str = "This field is required.";

/// Builds absolute API hyperlinks.
#[derive(Debug, Clone)]
pub struct Links<'a> {
    site_url: &'a str,
}

impl<'a> Links<'a> {
    pub fn new(site_url: &'a str) -> Self {
        Self { site_url }
    }

    fn api(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.site_url)
    }

    pub fn content(&self, id: i64) -> String {
        self.api(&format!("/content/{id}/"))
    }

    pub fn manage(&self, id: i64) -> String {
        self.api(&format!("/manage/{id}/"))
    }

    pub fn user(&self, id: Uuid) -> String {
        self.api(&format!("/users/{id}/"))
    }

    pub fn template(&self, name: &str) -> String {
        self.api(&format!("/templates/{name}/"))
    }
}

/// Public entry representation.
#[derive(Debug, Clone, Serialize)]
pub struct ContentRepr {
    pub url: String,
    pub id: i64,
    pub title: String,
    pub data: String,
    /// Hyperlink to the author's user resource.
    pub author: String,
    pub create_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub template: Option<String>,
    pub fields: Value,
}

impl ContentRepr {
    pub fn new(links: &Links<'_>, entry: &Entry) -> Self {
        Self {
            url: links.content(entry.id),
            id: entry.id,
            title: entry.title.clone(),
            data: entry.data.clone(),
            author: links.user(entry.author_id),
            create_date: entry.create_date,
            last_modified: entry.last_modified,
            template: entry.template.clone(),
            fields: entry.fields.clone(),
        }
    }
}

/// Author-facing entry representation with publication state.
#[derive(Debug, Clone, Serialize)]
pub struct ManageRepr {
    #[serde(flatten)]
    pub content: ContentRepr,

    /// Present when policies are enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<Vec<Policy>>,

    /// Present when policies are disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl ManageRepr {
    pub fn new(links: &Links<'_>, entry: &Entry, policies: &[Policy], use_policy: bool) -> Self {
        let mut content = ContentRepr::new(links, entry);
        content.url = links.manage(entry.id);
        let mut policy = policies.to_vec();
        policy.sort_by_key(|p| p.kind);
        Self {
            content,
            policy: use_policy.then_some(policy),
            is_active: (!use_policy).then_some(entry.is_active),
        }
    }

    pub fn from_view(links: &Links<'_>, view: &EntryView, use_policy: bool) -> Self {
        Self::new(links, &view.entry, &view.policies, use_policy)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRepr {
    pub url: String,
    pub id: Uuid,
    pub username: String,
}

impl UserRepr {
    pub fn new(links: &Links<'_>, user: &User) -> Self {
        Self {
            url: links.user(user.id),
            id: user.id,
            username: user.name.clone(),
        }
    }
}

/// Installed template in listings.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateSummary {
    pub url: String,
    pub name: String,
    pub label: String,
    pub description: String,
    pub field_count: usize,
    pub checksum: String,
    pub generated_at: DateTime<Utc>,
}

impl TemplateSummary {
    pub fn new(links: &Links<'_>, template: &GeneratedTemplate) -> Self {
        Self {
            url: links.template(&template.name),
            name: template.name.clone(),
            label: template.label.clone(),
            description: template.description.clone(),
            field_count: template.schema.fields.len(),
            checksum: template.checksum.clone(),
            generated_at: template.generated_at,
        }
    }
}

/// Paginated list response.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

impl PaginationMeta {
    /// Metadata for 1-based `page`, clamped to at least 1.
    pub fn new(total: usize, page: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        Self {
            total,
            page: page.max(1),
            per_page,
            total_pages: total.div_ceil(per_page),
        }
    }

    /// Saturates, so a page far past the end is simply empty.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

/// Slice one page out of `items`.
pub fn paginate<T>(items: Vec<T>, page: usize, per_page: usize) -> PaginatedResponse<T> {
    let pagination = PaginationMeta::new(items.len(), page, per_page);
    let items = items
        .into_iter()
        .skip(pagination.offset())
        .take(pagination.per_page)
        .collect();
    PaginatedResponse { items, pagination }
}

/// Deserialize a present field (even `null`) as `Some`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Entry write body for `/content/`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentWrite {
    pub title: Option<String>,
    pub data: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub template: Option<Option<String>>,
    pub fields: Option<Value>,
}

impl ContentWrite {
    pub fn into_draft(self) -> EntryDraft {
        EntryDraft {
            title: self.title,
            data: self.data,
            template: self.template,
            fields: self.fields.map(FieldInput::Json),
            is_active: None,
        }
    }
}

/// Entry write body for `/manage/`, with nested policies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManageWrite {
    pub title: Option<String>,
    pub data: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub template: Option<Option<String>>,
    pub fields: Option<Value>,
    #[serde(default)]
    pub policy: Vec<PolicyWrite>,
    pub is_active: Option<bool>,
}

impl ManageWrite {
    /// Split into the entry draft and the nested policy inputs.
    pub fn into_parts(self) -> Result<(EntryDraft, Vec<PolicyInput>), FieldErrors> {
        let draft = EntryDraft {
            title: self.title,
            data: self.data,
            template: self.template,
            fields: self.fields.map(FieldInput::Json),
            is_active: self.is_active,
        };
        let policies = self
            .policy
            .into_iter()
            .map(|p| p.into_input(None))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((draft, policies))
    }
}

/// Policy write body. `entry` is only read by `POST /policy/`.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyWrite {
    pub policy: Option<PolicyKind>,
    pub entry: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub start: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub end: Option<Option<DateTime<Utc>>>,
}

impl PolicyWrite {
    /// The requested policy state. A body without `policy` takes `current`,
    /// and is invalid when there is none.
    pub fn into_input(self, current: Option<PolicyKind>) -> Result<PolicyInput, FieldErrors> {
        let Some(kind) = self.policy.or(current) else {
            let mut errors = FieldErrors::new();
            errors.add("policy", REQUIRED);
            return Err(errors);
        };
        Ok(PolicyInput {
            kind,
            start: self.start,
            end: self.end,
        })
    }
}

/// Template install body.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateWrite {
    pub name: String,
    pub schema: Value,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entry() -> Entry {
        let now = Utc::now();
        Entry {
            id: 7,
            title: "Hello".to_string(),
            data: "World".to_string(),
            author_id: Uuid::nil(),
            create_date: now,
            last_modified: now,
            is_active: true,
            template: None,
            fields: json!({}),
        }
    }

    #[test]
    fn content_links_are_absolute() {
        let links = Links::new("https://blog.example.com");
        let value = serde_json::to_value(ContentRepr::new(&links, &entry())).unwrap();
        assert_eq!(value["url"], "https://blog.example.com/blogging/api/content/7/");
        assert_eq!(
            value["author"],
            format!("https://blog.example.com/blogging/api/users/{}/", Uuid::nil())
        );
        assert_eq!(value["template"], Value::Null);
    }

    #[test]
    fn manage_shows_policies_or_active_flag() {
        let links = Links::new("http://localhost:3000");
        let policies = vec![
            Policy { id: 2, entry: 7, kind: PolicyKind::Pin, start: None, end: None },
            Policy { id: 1, entry: 7, kind: PolicyKind::Publish, start: None, end: None },
        ];

        let with = serde_json::to_value(ManageRepr::new(&links, &entry(), &policies, true)).unwrap();
        assert_eq!(with["url"], "http://localhost:3000/blogging/api/manage/7/");
        assert_eq!(with["policy"][0]["policy"], "PUB");
        assert_eq!(with["policy"][1]["policy"], "PIN");
        assert!(with.get("is_active").is_none());

        let without = serde_json::to_value(ManageRepr::new(&links, &entry(), &policies, false)).unwrap();
        assert_eq!(without["is_active"], true);
        assert!(without.get("policy").is_none());
    }

    #[test]
    fn policy_write_distinguishes_null_from_absent() {
        let write: PolicyWrite =
            serde_json::from_value(json!({"policy": "publish", "start": null})).unwrap();
        let input = write.into_input(None).unwrap();
        assert_eq!(input.kind, PolicyKind::Publish);
        assert_eq!(input.start, Some(None));
        assert_eq!(input.end, None);
    }

    #[test]
    fn manage_write_splits_nested_policies() {
        let write: ManageWrite = serde_json::from_value(json!({
            "title": "Post",
            "policy": [{"policy": "PUB", "start": "2024-01-01T00:00:00Z"}]
        }))
        .unwrap();
        let (draft, policies) = write.into_parts().unwrap();
        assert_eq!(draft.title.as_deref(), Some("Post"));
        assert_eq!(draft.template, None);
        assert_eq!(policies.len(), 1);
        assert!(policies[0].start.unwrap().is_some());
    }

    #[test]
    fn policy_kind_is_required_without_a_current_one() {
        let write: PolicyWrite = serde_json::from_value(json!({"end": null})).unwrap();
        let errors = write.clone().into_input(None).unwrap_err();
        assert_eq!(errors.get("policy").unwrap(), [REQUIRED.to_string()]);
        assert_eq!(write.into_input(Some(PolicyKind::Pin)).unwrap().kind, PolicyKind::Pin);
    }

    #[test]
    fn pagination_slices_pages() {
        let page = paginate((1..=25).collect::<Vec<_>>(), 3, 10);
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.pagination.total_pages, 3);
        assert!(!page.pagination.has_next());
        assert!(page.pagination.has_prev());

        let beyond = paginate((1..=25).collect::<Vec<_>>(), usize::MAX, 10);
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.pagination.offset(), usize::MAX);
        assert!(!beyond.pagination.has_next());

        let empty = paginate(Vec::<i32>::new(), 0, 10);
        assert_eq!(empty.pagination.page, 1);
        assert_eq!(empty.pagination.total_pages, 0);
        assert!(empty.items.is_empty());
    }
}
