//! Content storage abstraction.
//!
//! All entry, policy and user persistence goes through [`ContentStore`].
//! Two backends exist: [`PgContentStore`] (PostgreSQL via sqlx) and
//! [`MemoryContentStore`] (process memory, for development and tests).
//!
//! Writes that touch an entry together with its policies are atomic in both
//! backends: either every row lands or none do.

mod memory;
mod pg;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryContentStore;
pub use pg::PgContentStore;

use crate::models::{Entry, EntryChanges, NewEntry, NewUser, Policy, PolicyInput, User};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness rule would be violated.
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Entry listing parameters.
#[derive(Debug, Clone, Default)]
pub struct EntryQuery {
    /// Restrict to one author.
    pub author: Option<Uuid>,
}

impl EntryQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_author(author: Uuid) -> Self {
        Self {
            author: Some(author),
        }
    }
}

/// Persistence for entries, their policies and users.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert an entry and its policies in one transaction.
    async fn create_entry(
        &self,
        entry: NewEntry,
        policies: Vec<PolicyInput>,
    ) -> StoreResult<(Entry, Vec<Policy>)>;

    async fn find_entry(&self, id: i64) -> StoreResult<Option<Entry>>;

    /// Update an entry and upsert its policies by kind in one transaction.
    ///
    /// Returns None when the entry does not exist.
    async fn update_entry(
        &self,
        id: i64,
        changes: EntryChanges,
        policies: Vec<PolicyInput>,
    ) -> StoreResult<Option<Entry>>;

    /// Delete an entry; its policies go with it.
    async fn delete_entry(&self, id: i64) -> StoreResult<bool>;

    /// List entries, newest first.
    async fn list_entries(&self, query: EntryQuery) -> StoreResult<Vec<Entry>>;

    /// Policies belonging to any of the given entries.
    async fn policies_for(&self, entry_ids: &[i64]) -> StoreResult<Vec<Policy>>;

    async fn find_policy(&self, id: i64) -> StoreResult<Option<Policy>>;

    /// Attach a new policy. Fails with `Conflict` if the entry already has
    /// one of that kind.
    async fn create_policy(&self, entry_id: i64, input: PolicyInput) -> StoreResult<Policy>;

    /// Update a policy's window. `input.kind` is ignored; a policy never
    /// changes kind.
    async fn update_policy(&self, id: i64, input: PolicyInput) -> StoreResult<Option<Policy>>;

    async fn delete_policy(&self, id: i64) -> StoreResult<bool>;

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_name(&self, name: &str) -> StoreResult<Option<User>>;

    /// Create a user. Fails with `Conflict` on a duplicate name.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    /// Whether the backend is reachable.
    async fn healthy(&self) -> bool;
}
