//! In-memory content store.
//!
//! Holds everything behind one `parking_lot::RwLock`. A write takes the lock
//! once for the whole operation, which makes multi-row writes atomic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{ContentStore, EntryQuery, StoreError, StoreResult};
use crate::models::{Entry, EntryChanges, NewEntry, NewUser, Policy, PolicyInput, User};

/// Content store backed by process memory.
#[derive(Default)]
pub struct MemoryContentStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    entries: BTreeMap<i64, Entry>,
    policies: BTreeMap<i64, Policy>,
    users: HashMap<Uuid, User>,
    last_entry_id: i64,
    last_policy_id: i64,
}

impl MemoryInner {
    fn next_entry_id(&mut self) -> i64 {
        self.last_entry_id += 1;
        self.last_entry_id
    }

    fn next_policy_id(&mut self) -> i64 {
        self.last_policy_id += 1;
        self.last_policy_id
    }

    fn policy_of_kind(&self, entry_id: i64, input: &PolicyInput) -> Option<&Policy> {
        self.policies
            .values()
            .find(|p| p.entry == entry_id && p.kind == input.kind)
    }

    /// Upsert a policy by kind. Caller holds the write lock.
    fn upsert_policy(&mut self, entry_id: i64, input: &PolicyInput) -> Policy {
        let existing = self.policy_of_kind(entry_id, input).cloned();
        let (start, end) = input.resolve(existing.as_ref());
        let id = match existing {
            Some(p) => p.id,
            None => self.next_policy_id(),
        };
        let policy = Policy {
            id,
            entry: entry_id,
            kind: input.kind,
            start,
            end,
        };
        self.policies.insert(id, policy.clone());
        policy
    }
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn create_entry(
        &self,
        entry: NewEntry,
        policies: Vec<PolicyInput>,
    ) -> StoreResult<(Entry, Vec<Policy>)> {
        let mut inner = self.inner.write();
        let now = Utc::now();
        let id = inner.next_entry_id();
        let created = Entry {
            id,
            title: entry.title,
            data: entry.data,
            author_id: entry.author_id,
            create_date: now,
            last_modified: now,
            is_active: entry.is_active,
            template: entry.template,
            fields: entry.fields,
        };
        inner.entries.insert(id, created.clone());

        let stored: Vec<Policy> = policies
            .iter()
            .map(|input| inner.upsert_policy(id, input))
            .collect();

        Ok((created, stored))
    }

    async fn find_entry(&self, id: i64) -> StoreResult<Option<Entry>> {
        Ok(self.inner.read().entries.get(&id).cloned())
    }

    async fn update_entry(
        &self,
        id: i64,
        changes: EntryChanges,
        policies: Vec<PolicyInput>,
    ) -> StoreResult<Option<Entry>> {
        let mut inner = self.inner.write();
        let Some(entry) = inner.entries.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply_to(entry, Utc::now());
        let updated = entry.clone();

        for input in &policies {
            inner.upsert_policy(id, input);
        }

        Ok(Some(updated))
    }

    async fn delete_entry(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        let removed = inner.entries.remove(&id).is_some();
        if removed {
            inner.policies.retain(|_, p| p.entry != id);
        }
        Ok(removed)
    }

    async fn list_entries(&self, query: EntryQuery) -> StoreResult<Vec<Entry>> {
        let inner = self.inner.read();
        let mut entries: Vec<Entry> = inner
            .entries
            .values()
            .filter(|e| query.author.is_none_or(|a| e.author_id == a))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.create_date
                .cmp(&a.create_date)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(entries)
    }

    async fn policies_for(&self, entry_ids: &[i64]) -> StoreResult<Vec<Policy>> {
        let inner = self.inner.read();
        Ok(inner
            .policies
            .values()
            .filter(|p| entry_ids.contains(&p.entry))
            .cloned()
            .collect())
    }

    async fn find_policy(&self, id: i64) -> StoreResult<Option<Policy>> {
        Ok(self.inner.read().policies.get(&id).cloned())
    }

    async fn create_policy(&self, entry_id: i64, input: PolicyInput) -> StoreResult<Policy> {
        let mut inner = self.inner.write();
        if !inner.entries.contains_key(&entry_id) {
            return Err(StoreError::Other(anyhow::anyhow!(
                "entry {entry_id} does not exist"
            )));
        }
        if inner.policy_of_kind(entry_id, &input).is_some() {
            return Err(StoreError::Conflict(format!(
                "entry {entry_id} already has a {} policy",
                input.kind
            )));
        }
        Ok(inner.upsert_policy(entry_id, &input))
    }

    async fn update_policy(&self, id: i64, input: PolicyInput) -> StoreResult<Option<Policy>> {
        let mut inner = self.inner.write();
        let Some(policy) = inner.policies.get_mut(&id) else {
            return Ok(None);
        };
        let (start, end) = input.resolve(Some(&*policy));
        policy.start = start;
        policy.end = end;
        Ok(Some(policy.clone()))
    }

    async fn delete_policy(&self, id: i64) -> StoreResult<bool> {
        Ok(self.inner.write().policies.remove(&id).is_some())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.inner.read().users.get(&id).cloned())
    }

    async fn find_user_by_name(&self, name: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read();
        Ok(inner
            .users
            .values()
            .find(|u| u.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut inner = self.inner.write();
        if inner
            .users
            .values()
            .any(|u| u.name.eq_ignore_ascii_case(&user.name))
        {
            return Err(StoreError::Conflict(format!(
                "user '{}' already exists",
                user.name
            )));
        }
        let created = User {
            id: Uuid::now_v7(),
            name: user.name,
            pass: user.pass,
            mail: user.mail,
            is_admin: user.is_admin,
            created: Utc::now(),
            status: 1,
        };
        inner.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn healthy(&self) -> bool {
        true
    }
}
