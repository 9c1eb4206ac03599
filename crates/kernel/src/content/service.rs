//! Entry service.
//!
//! Business rules for entries and their policies: validation, author checks,
//! publish and pin transitions, and evaluated listings. HTML views and the
//! REST API both go through this service.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::error::FieldErrors;
use crate::models::policy::validate_window;
use crate::models::{
    Entry, EntryChanges, NewEntry, Policy, PolicyInput, PolicyKind, TITLE_MAX_LENGTH, User,
};
use crate::policy::{PolicyEvaluator, PolicyFilter, Visibility};
use crate::store::{ContentStore, EntryQuery, StoreError};
use crate::template::TemplateRegistry;

/// Message for an entry with neither title nor body.
pub const EMPTY_ENTRY_MESSAGE: &str = "Either title or content must be non-empty";

/// Entry service errors.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("not found")]
    NotFound,

    #[error("access denied")]
    Forbidden,

    #[error("invalid input: {0}")]
    Validation(FieldErrors),

    #[error("publication policies are disabled")]
    PolicyDisabled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<FieldErrors> for ContentError {
    fn from(errors: FieldErrors) -> Self {
        ContentError::Validation(errors)
    }
}

pub type ContentResult<T> = Result<T, ContentError>;

/// Template field values as submitted.
#[derive(Debug, Clone)]
pub enum FieldInput {
    /// HTML form strings.
    Form(HashMap<String, String>),
    /// API JSON object.
    Json(Value),
}

/// Requested entry content. `None` keeps the stored value on update and means
/// empty on create.
#[derive(Debug, Clone, Default)]
pub struct EntryDraft {
    pub title: Option<String>,
    pub data: Option<String>,
    pub template: Option<Option<String>>,
    pub fields: Option<FieldInput>,
    pub is_active: Option<bool>,
}

/// An entry together with its policies and evaluated visibility.
#[derive(Debug, Clone)]
pub struct EntryView {
    pub entry: Entry,
    pub policies: Vec<Policy>,
    pub visibility: Visibility,
}

/// Entry CRUD and publication rules.
#[derive(Clone)]
pub struct EntryService {
    inner: Arc<EntryServiceInner>,
}

struct EntryServiceInner {
    store: Arc<dyn ContentStore>,
    templates: TemplateRegistry,
    evaluator: PolicyEvaluator,
}

/// Whether `user` may change `entry`.
pub fn can_edit(entry: &Entry, user: &User) -> bool {
    user.is_admin || entry.is_authored_by(user.id)
}

impl EntryService {
    pub fn new(
        store: Arc<dyn ContentStore>,
        templates: TemplateRegistry,
        evaluator: PolicyEvaluator,
    ) -> Self {
        Self {
            inner: Arc::new(EntryServiceInner {
                store,
                templates,
                evaluator,
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.inner.store
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.inner.templates
    }

    pub fn evaluator(&self) -> PolicyEvaluator {
        self.inner.evaluator
    }

    pub fn uses_policy(&self) -> bool {
        self.inner.evaluator.uses_policy()
    }

    /// Create an entry with its initial policies.
    pub async fn create(
        &self,
        author: &User,
        draft: EntryDraft,
        policies: Vec<PolicyInput>,
    ) -> ContentResult<(Entry, Vec<Policy>)> {
        let mut errors = FieldErrors::new();
        let title = draft.title.unwrap_or_default();
        let data = draft.data.unwrap_or_default();
        let template = draft.template.flatten();
        let (title, data) = check_text(title, data, &mut errors);
        let fields = self.clean_fields(template.as_deref(), draft.fields, &mut errors);
        let policies = self.check_policies(policies, &[], &mut errors)?;
        errors.into_result(())?;

        let new = NewEntry {
            title,
            data,
            author_id: author.id,
            is_active: draft.is_active.unwrap_or(false),
            template,
            fields,
        };
        let (entry, policies) = self.inner.store.create_entry(new, policies).await?;

        info!(
            entry_id = entry.id,
            author = %author.id,
            template = ?entry.template,
            policies = policies.len(),
            "entry created"
        );
        Ok((entry, policies))
    }

    /// Update an entry and upsert the given policies by kind.
    pub async fn update(
        &self,
        id: i64,
        actor: &User,
        draft: EntryDraft,
        policies: Vec<PolicyInput>,
    ) -> ContentResult<(Entry, Vec<Policy>)> {
        let entry = self.editable(id, actor).await?;
        let existing = self.inner.store.policies_for(&[id]).await?;

        let mut errors = FieldErrors::new();
        let title = draft.title.unwrap_or_else(|| entry.title.clone());
        let data = draft.data.unwrap_or_else(|| entry.data.clone());
        let (title, data) = check_text(title, data, &mut errors);

        let template_changed = draft
            .template
            .as_ref()
            .is_some_and(|t| *t != entry.template);
        let template = draft.template.clone().unwrap_or_else(|| entry.template.clone());
        let fields = if draft.fields.is_some() || template_changed {
            Some(self.clean_fields(template.as_deref(), draft.fields, &mut errors))
        } else {
            None
        };
        let policies = self.check_policies(policies, &existing, &mut errors)?;
        errors.into_result(())?;

        let changes = EntryChanges {
            title: Some(title),
            data: Some(data),
            is_active: draft.is_active,
            template: draft.template.map(|_| template.clone()),
            fields,
        };
        let entry = self
            .inner
            .store
            .update_entry(id, changes, policies)
            .await?
            .ok_or(ContentError::NotFound)?;
        let policies = self.inner.store.policies_for(&[id]).await?;

        info!(
            entry_id = entry.id,
            author = %actor.id,
            template = ?entry.template,
            "entry updated"
        );
        Ok((entry, policies))
    }

    pub async fn delete(&self, id: i64, actor: &User) -> ContentResult<()> {
        self.editable(id, actor).await?;
        if !self.inner.store.delete_entry(id).await? {
            return Err(ContentError::NotFound);
        }
        info!(entry_id = id, author = %actor.id, "entry deleted");
        Ok(())
    }

    /// Publish from `now` with no end.
    pub async fn publish(&self, id: i64, actor: &User, now: DateTime<Utc>) -> ContentResult<EntryView> {
        if self.uses_policy() {
            self.set_window(id, actor, PolicyInput::open_from(PolicyKind::Publish, now))
                .await?;
        } else {
            self.set_active(id, actor, true).await?;
        }
        info!(entry_id = id, author = %actor.id, "entry published");
        self.require(id, now).await
    }

    /// Withdraw publication by clearing the publish start.
    pub async fn unpublish(&self, id: i64, actor: &User, now: DateTime<Utc>) -> ContentResult<EntryView> {
        if self.uses_policy() {
            self.set_window(id, actor, clear_start(PolicyKind::Publish))
                .await?;
        } else {
            self.set_active(id, actor, false).await?;
        }
        info!(entry_id = id, author = %actor.id, "entry unpublished");
        self.require(id, now).await
    }

    pub async fn pin(&self, id: i64, actor: &User, now: DateTime<Utc>) -> ContentResult<EntryView> {
        if !self.uses_policy() {
            return Err(ContentError::PolicyDisabled);
        }
        self.set_window(id, actor, PolicyInput::open_from(PolicyKind::Pin, now))
            .await?;
        info!(entry_id = id, author = %actor.id, "entry pinned");
        self.require(id, now).await
    }

    pub async fn unpin(&self, id: i64, actor: &User, now: DateTime<Utc>) -> ContentResult<EntryView> {
        if !self.uses_policy() {
            return Err(ContentError::PolicyDisabled);
        }
        self.set_window(id, actor, clear_start(PolicyKind::Pin)).await?;
        info!(entry_id = id, author = %actor.id, "entry unpinned");
        self.require(id, now).await
    }

    /// Entries visible to the public, pinned first.
    pub async fn list_public(
        &self,
        filter: Option<PolicyFilter>,
        now: DateTime<Utc>,
    ) -> ContentResult<Vec<EntryView>> {
        self.list(EntryQuery::all(), filter.unwrap_or(PolicyFilter::Published), now)
            .await
    }

    /// One author's entries, unfiltered unless asked.
    pub async fn list_for_author(
        &self,
        author: Uuid,
        filter: Option<PolicyFilter>,
        now: DateTime<Utc>,
    ) -> ContentResult<Vec<EntryView>> {
        self.list(EntryQuery::by_author(author), filter.unwrap_or_default(), now)
            .await
    }

    pub async fn get(&self, id: i64, now: DateTime<Utc>) -> ContentResult<Option<EntryView>> {
        let Some(entry) = self.inner.store.find_entry(id).await? else {
            return Ok(None);
        };
        let policies = self.inner.store.policies_for(&[id]).await?;
        let visibility = self.inner.evaluator.evaluate(&entry, &policies, now);
        Ok(Some(EntryView {
            entry,
            policies,
            visibility,
        }))
    }

    /// Policies of entries `actor` may edit, optionally for one entry.
    pub async fn list_policies(&self, actor: &User, entry: Option<i64>) -> ContentResult<Vec<Policy>> {
        let ids: Vec<i64> = match entry {
            Some(id) => match self.inner.store.find_entry(id).await? {
                Some(e) if can_edit(&e, actor) => vec![id],
                _ => Vec::new(),
            },
            None => {
                let query = if actor.is_admin {
                    EntryQuery::all()
                } else {
                    EntryQuery::by_author(actor.id)
                };
                self.inner
                    .store
                    .list_entries(query)
                    .await?
                    .into_iter()
                    .map(|e| e.id)
                    .collect()
            }
        };
        Ok(self.inner.store.policies_for(&ids).await?)
    }

    /// A policy whose entry `actor` may edit. Others look missing.
    pub async fn get_policy(&self, id: i64, actor: &User) -> ContentResult<Policy> {
        let policy = self
            .inner
            .store
            .find_policy(id)
            .await?
            .ok_or(ContentError::NotFound)?;
        match self.inner.store.find_entry(policy.entry).await? {
            Some(entry) if can_edit(&entry, actor) => Ok(policy),
            _ => Err(ContentError::NotFound),
        }
    }

    /// Attach a policy to an owned entry.
    pub async fn create_policy(
        &self,
        entry_id: i64,
        actor: &User,
        input: PolicyInput,
    ) -> ContentResult<Policy> {
        if !self.uses_policy() {
            return Err(ContentError::PolicyDisabled);
        }
        let mut errors = FieldErrors::new();
        match self.inner.store.find_entry(entry_id).await? {
            Some(entry) if can_edit(&entry, actor) => {}
            Some(_) => return Err(ContentError::Forbidden),
            None => {
                errors.add("entry", format!("Invalid pk \"{entry_id}\" - object does not exist."));
                return Err(errors.into());
            }
        }

        let (start, end) = input.resolve(None);
        if let Err(e) = validate_window(start, end) {
            errors.add("end", e);
            return Err(errors.into());
        }

        let policy = match self.inner.store.create_policy(entry_id, input).await {
            Ok(policy) => policy,
            Err(StoreError::Conflict(_)) => {
                errors.add(
                    "policy",
                    "The fields entry, policy must make a unique set.",
                );
                return Err(errors.into());
            }
            Err(e) => return Err(e.into()),
        };
        info!(entry_id, policy_id = policy.id, kind = %policy.kind, "policy created");
        Ok(policy)
    }

    /// Change an owned policy's window. Its kind never changes.
    pub async fn update_policy(&self, id: i64, actor: &User, input: PolicyInput) -> ContentResult<Policy> {
        let existing = self.get_policy(id, actor).await?;
        if input.kind != existing.kind {
            let mut errors = FieldErrors::new();
            errors.add("policy", "A policy cannot change kind.");
            return Err(errors.into());
        }
        let (start, end) = input.resolve(Some(&existing));
        if let Err(e) = validate_window(start, end) {
            let mut errors = FieldErrors::new();
            errors.add("end", e);
            return Err(errors.into());
        }

        let policy = self
            .inner
            .store
            .update_policy(id, input)
            .await?
            .ok_or(ContentError::NotFound)?;
        info!(entry_id = policy.entry, policy_id = id, kind = %policy.kind, "policy updated");
        Ok(policy)
    }

    pub async fn delete_policy(&self, id: i64, actor: &User) -> ContentResult<()> {
        let policy = self.get_policy(id, actor).await?;
        self.inner.store.delete_policy(id).await?;
        info!(entry_id = policy.entry, policy_id = id, "policy deleted");
        Ok(())
    }

    async fn list(
        &self,
        query: EntryQuery,
        filter: PolicyFilter,
        now: DateTime<Utc>,
    ) -> ContentResult<Vec<EntryView>> {
        let entries = self.inner.store.list_entries(query).await?;
        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        let policies = if self.uses_policy() {
            self.inner.store.policies_for(&ids).await?
        } else {
            Vec::new()
        };

        let mut by_entry: HashMap<i64, Vec<Policy>> = HashMap::new();
        for policy in &policies {
            by_entry.entry(policy.entry).or_default().push(policy.clone());
        }

        Ok(self
            .inner
            .evaluator
            .apply(filter, entries, &policies, now)
            .into_iter()
            .map(|(entry, visibility)| EntryView {
                policies: by_entry.remove(&entry.id).unwrap_or_default(),
                entry,
                visibility,
            })
            .collect())
    }

    /// Load an entry `actor` may change.
    async fn editable(&self, id: i64, actor: &User) -> ContentResult<Entry> {
        let entry = self
            .inner
            .store
            .find_entry(id)
            .await?
            .ok_or(ContentError::NotFound)?;
        if !can_edit(&entry, actor) {
            return Err(ContentError::Forbidden);
        }
        Ok(entry)
    }

    async fn require(&self, id: i64, now: DateTime<Utc>) -> ContentResult<EntryView> {
        self.get(id, now).await?.ok_or(ContentError::NotFound)
    }

    async fn set_window(&self, id: i64, actor: &User, input: PolicyInput) -> ContentResult<()> {
        self.editable(id, actor).await?;
        self.inner
            .store
            .update_entry(id, EntryChanges::default(), vec![input])
            .await?
            .ok_or(ContentError::NotFound)?;
        Ok(())
    }

    async fn set_active(&self, id: i64, actor: &User, active: bool) -> ContentResult<()> {
        self.editable(id, actor).await?;
        let changes = EntryChanges {
            is_active: Some(active),
            ..Default::default()
        };
        self.inner
            .store
            .update_entry(id, changes, Vec::new())
            .await?
            .ok_or(ContentError::NotFound)?;
        Ok(())
    }

    /// Clean template field values. Errors land under `fields.<name>`.
    fn clean_fields(
        &self,
        template: Option<&str>,
        input: Option<FieldInput>,
        errors: &mut FieldErrors,
    ) -> Value {
        let Some(name) = template else {
            let supplied = match &input {
                Some(FieldInput::Form(map)) => !map.is_empty(),
                Some(FieldInput::Json(Value::Object(map))) => !map.is_empty(),
                Some(FieldInput::Json(Value::Null)) | None => false,
                Some(FieldInput::Json(_)) => true,
            };
            if supplied {
                errors.add("fields", "Template fields require a template.");
            }
            return Value::Object(Map::new());
        };

        let Some(template) = self.inner.templates.get(name) else {
            errors.add("template", format!("Unknown template \"{name}\"."));
            return Value::Object(Map::new());
        };

        let cleaned = match input {
            Some(FieldInput::Form(map)) => template.model.clean_form(&map),
            Some(FieldInput::Json(value)) => template.model.clean_json(&value),
            None => template.model.clean_json(&Value::Null),
        };
        match cleaned {
            Ok(map) => Value::Object(map),
            Err(field_errors) => {
                errors.merge_prefixed("fields", field_errors);
                Value::Object(Map::new())
            }
        }
    }

    /// Validate policy windows against the stored ones and fix every input's
    /// window so the store does not fall back again.
    fn check_policies(
        &self,
        policies: Vec<PolicyInput>,
        existing: &[Policy],
        errors: &mut FieldErrors,
    ) -> ContentResult<Vec<PolicyInput>> {
        if policies.is_empty() {
            return Ok(policies);
        }
        if !self.uses_policy() {
            return Err(ContentError::PolicyDisabled);
        }

        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(policies.len());
        for input in policies {
            if !seen.insert(input.kind) {
                errors.add("policy", format!("Duplicate {} policy.", input.kind));
                continue;
            }
            let current = existing.iter().find(|p| p.kind == input.kind);
            let (start, end) = input.resolve(current);
            if let Err(e) = validate_window(start, end) {
                errors.add("policy", e);
                continue;
            }
            resolved.push(PolicyInput {
                kind: input.kind,
                start: Some(start),
                end: Some(end),
            });
        }
        Ok(resolved)
    }
}

fn clear_start(kind: PolicyKind) -> PolicyInput {
    PolicyInput {
        kind,
        start: Some(None),
        end: None,
    }
}

/// Trim and check title and body. Returns the values to store.
fn check_text(title: String, data: String, errors: &mut FieldErrors) -> (String, String) {
    let title = title.trim().to_string();
    let data = if data.trim().is_empty() {
        String::new()
    } else {
        data
    };

    let length = title.chars().count();
    if length > TITLE_MAX_LENGTH {
        errors.add(
            "title",
            format!(
                "Ensure this field has no more than {TITLE_MAX_LENGTH} characters (it has {length})."
            ),
        );
    }
    if title.is_empty() && data.is_empty() {
        errors.add("detail", EMPTY_ENTRY_MESSAGE);
    }
    (title, data)
}
