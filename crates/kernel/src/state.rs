//! Application state shared across all handlers.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{BlogSettings, Config};
use crate::content::EntryService;
use crate::db;
use crate::policy::PolicyEvaluator;
use crate::store::{ContentStore, MemoryContentStore, PgContentStore};
use crate::template::TemplateRegistry;
use crate::theme::ThemeEngine;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Blog behaviour (policy mode, page size, site URL).
    settings: BlogSettings,

    /// Entry and policy rules over the content store.
    entries: EntryService,

    /// Theme engine for template rendering.
    theme: Arc<ThemeEngine>,
}

impl AppState {
    /// Connect to PostgreSQL, apply migrations and load generated templates.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = db::create_pool(config.require_database_url()?, config.database_max_connections)
            .await?;
        info!("connected to PostgreSQL");

        db::run_migrations(&pool).await?;
        info!("database migrations applied");

        let store: Arc<dyn ContentStore> = Arc::new(PgContentStore::new(pool));
        let templates = TemplateRegistry::new(&config.generated_dir);
        templates
            .load_from_dir()
            .context("failed to load generated templates")?;

        let theme = ThemeEngine::new(config.templates_dir.as_deref())
            .context("failed to initialize theme engine")?;

        Ok(Self::from_parts(
            config.blog.clone(),
            store,
            templates,
            theme,
        ))
    }

    /// State over the in-memory store with the embedded theme.
    ///
    /// Used by tests and by local runs without a database.
    pub fn in_memory(settings: BlogSettings, generated_dir: &Path) -> Result<Self> {
        let templates = TemplateRegistry::new(generated_dir);
        templates
            .load_from_dir()
            .context("failed to load generated templates")?;
        let theme = ThemeEngine::new(None)?;
        Ok(Self::from_parts(
            settings,
            Arc::new(MemoryContentStore::new()),
            templates,
            theme,
        ))
    }

    /// Assemble state from already-built parts.
    pub fn from_parts(
        settings: BlogSettings,
        store: Arc<dyn ContentStore>,
        templates: TemplateRegistry,
        theme: ThemeEngine,
    ) -> Self {
        let entries = EntryService::new(
            store,
            templates,
            PolicyEvaluator::new(settings.use_policy),
        );
        Self {
            inner: Arc::new(AppStateInner {
                settings,
                entries,
                theme: Arc::new(theme),
            }),
        }
    }

    pub fn settings(&self) -> &BlogSettings {
        &self.inner.settings
    }

    pub fn entries(&self) -> &EntryService {
        &self.inner.entries
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        self.inner.entries.store()
    }

    pub fn templates(&self) -> &TemplateRegistry {
        self.inner.entries.templates()
    }

    pub fn theme(&self) -> &Arc<ThemeEngine> {
        &self.inner.theme
    }

    /// Check if the content store is reachable.
    pub async fn store_healthy(&self) -> bool {
        self.store().healthy().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_state_uses_settings() {
        let dir = tempfile::tempdir().unwrap();
        let settings = BlogSettings {
            use_policy: false,
            page_size: 5,
            site_url: "https://blog.example.com".to_string(),
        };
        let state = AppState::in_memory(settings, dir.path()).unwrap();

        assert!(!state.entries().uses_policy());
        assert_eq!(state.settings().page_size, 5);
        assert_eq!(state.settings().site_url, "https://blog.example.com");
        assert!(state.templates().is_empty());
    }

    #[tokio::test]
    async fn memory_store_is_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::in_memory(BlogSettings::default(), dir.path()).unwrap();
        assert!(state.store_healthy().await);
    }
}
