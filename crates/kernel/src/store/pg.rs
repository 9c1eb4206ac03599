//! PostgreSQL content store.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{ContentStore, EntryQuery, StoreError, StoreResult};
use crate::models::{
    Entry, EntryChanges, NewEntry, NewUser, Policy, PolicyInput, PolicyRow, User,
};

const ENTRY_COLUMNS: &str =
    "id, title, data, author_id, create_date, last_modified, is_active, template, fields";

const POLICY_COLUMNS: &str = "id, entry_id, kind, start_at, end_at";

const USER_COLUMNS: &str = "id, name, pass, mail, is_admin, created, status";

/// Content store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map unique-constraint violations to `Conflict`.
fn map_unique(err: sqlx::Error, message: impl FnOnce() -> String) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(message()),
        _ => StoreError::Database(err),
    }
}

/// Upsert a policy by kind inside an open transaction.
async fn upsert_policy(
    tx: &mut Transaction<'_, Postgres>,
    entry_id: i64,
    input: &PolicyInput,
) -> StoreResult<Policy> {
    let existing = sqlx::query_as::<_, PolicyRow>(&format!(
        "SELECT {POLICY_COLUMNS} FROM blog_policy WHERE entry_id = $1 AND kind = $2 FOR UPDATE"
    ))
    .bind(entry_id)
    .bind(input.kind.code())
    .fetch_optional(&mut **tx)
    .await?
    .map(Policy::try_from)
    .transpose()?;

    let (start, end) = input.resolve(existing.as_ref());

    let row = sqlx::query_as::<_, PolicyRow>(&format!(
        r#"
        INSERT INTO blog_policy (entry_id, kind, start_at, end_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (entry_id, kind) DO UPDATE SET
            start_at = EXCLUDED.start_at,
            end_at = EXCLUDED.end_at
        RETURNING {POLICY_COLUMNS}
        "#
    ))
    .bind(entry_id)
    .bind(input.kind.code())
    .bind(start)
    .bind(end)
    .fetch_one(&mut **tx)
    .await?;

    Ok(Policy::try_from(row)?)
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn create_entry(
        &self,
        entry: NewEntry,
        policies: Vec<PolicyInput>,
    ) -> StoreResult<(Entry, Vec<Policy>)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to start transaction")?;

        let created = sqlx::query_as::<_, Entry>(&format!(
            r#"
            INSERT INTO blog_entry (title, data, author_id, is_active, template, fields)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(&entry.title)
        .bind(&entry.data)
        .bind(entry.author_id)
        .bind(entry.is_active)
        .bind(&entry.template)
        .bind(&entry.fields)
        .fetch_one(&mut *tx)
        .await?;

        let mut stored = Vec::with_capacity(policies.len());
        for input in &policies {
            stored.push(upsert_policy(&mut tx, created.id, input).await?);
        }

        tx.commit().await.context("failed to commit transaction")?;

        Ok((created, stored))
    }

    async fn find_entry(&self, id: i64) -> StoreResult<Option<Entry>> {
        let entry = sqlx::query_as::<_, Entry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM blog_entry WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn update_entry(
        &self,
        id: i64,
        changes: EntryChanges,
        policies: Vec<PolicyInput>,
    ) -> StoreResult<Option<Entry>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to start transaction")?;

        let Some(mut entry) = sqlx::query_as::<_, Entry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM blog_entry WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        changes.apply_to(&mut entry, chrono::Utc::now());

        let updated = sqlx::query_as::<_, Entry>(&format!(
            r#"
            UPDATE blog_entry SET
                title = $1,
                data = $2,
                is_active = $3,
                template = $4,
                fields = $5,
                last_modified = $6
            WHERE id = $7
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(&entry.title)
        .bind(&entry.data)
        .bind(entry.is_active)
        .bind(&entry.template)
        .bind(&entry.fields)
        .bind(entry.last_modified)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        for input in &policies {
            upsert_policy(&mut tx, id, input).await?;
        }

        tx.commit().await.context("failed to commit transaction")?;

        Ok(Some(updated))
    }

    async fn delete_entry(&self, id: i64) -> StoreResult<bool> {
        // Policies are deleted via CASCADE
        let result = sqlx::query("DELETE FROM blog_entry WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_entries(&self, query: EntryQuery) -> StoreResult<Vec<Entry>> {
        let entries = match query.author {
            Some(author) => {
                sqlx::query_as::<_, Entry>(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM blog_entry WHERE author_id = $1 ORDER BY create_date DESC, id DESC"
                ))
                .bind(author)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Entry>(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM blog_entry ORDER BY create_date DESC, id DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(entries)
    }

    async fn policies_for(&self, entry_ids: &[i64]) -> StoreResult<Vec<Policy>> {
        if entry_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, PolicyRow>(&format!(
            "SELECT {POLICY_COLUMNS} FROM blog_policy WHERE entry_id = ANY($1) ORDER BY id"
        ))
        .bind(entry_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Policy::try_from(row).map_err(StoreError::from))
            .collect()
    }

    async fn find_policy(&self, id: i64) -> StoreResult<Option<Policy>> {
        let row = sqlx::query_as::<_, PolicyRow>(&format!(
            "SELECT {POLICY_COLUMNS} FROM blog_policy WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Policy::try_from).transpose()?)
    }

    async fn create_policy(&self, entry_id: i64, input: PolicyInput) -> StoreResult<Policy> {
        let (start, end) = input.resolve(None);
        let row = sqlx::query_as::<_, PolicyRow>(&format!(
            r#"
            INSERT INTO blog_policy (entry_id, kind, start_at, end_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {POLICY_COLUMNS}
            "#
        ))
        .bind(entry_id)
        .bind(input.kind.code())
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            map_unique(e, || {
                format!("entry {entry_id} already has a {} policy", input.kind)
            })
        })?;

        Ok(Policy::try_from(row)?)
    }

    async fn update_policy(&self, id: i64, input: PolicyInput) -> StoreResult<Option<Policy>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to start transaction")?;

        let Some(existing) = sqlx::query_as::<_, PolicyRow>(&format!(
            "SELECT {POLICY_COLUMNS} FROM blog_policy WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Policy::try_from)
        .transpose()?
        else {
            return Ok(None);
        };

        let (start, end) = input.resolve(Some(&existing));
        let row = sqlx::query_as::<_, PolicyRow>(&format!(
            "UPDATE blog_policy SET start_at = $1, end_at = $2 WHERE id = $3 RETURNING {POLICY_COLUMNS}"
        ))
        .bind(start)
        .bind(end)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await.context("failed to commit transaction")?;

        Ok(Some(Policy::try_from(row)?))
    }

    async fn delete_policy(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM blog_policy WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_name(&self, name: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(name) = LOWER($1)"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, pass, mail, is_admin)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(&user.name)
        .bind(&user.pass)
        .bind(&user.mail)
        .bind(user.is_admin)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, || format!("user '{}' already exists", user.name)))?;

        Ok(created)
    }

    async fn healthy(&self) -> bool {
        crate::db::check_health(&self.pool).await
    }
}
