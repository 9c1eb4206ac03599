//! Runtime template registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::info;

use super::generator::{GeneratedTemplate, generate};
use super::{TemplateError, artifact};

/// Installed templates, cached in memory and backed by artifact files.
#[derive(Clone)]
pub struct TemplateRegistry {
    inner: Arc<TemplateRegistryInner>,
}

struct TemplateRegistryInner {
    dir: PathBuf,
    templates: DashMap<String, Arc<GeneratedTemplate>>,
}

impl TemplateRegistry {
    /// Create an empty registry whose artifacts live in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(TemplateRegistryInner {
                dir: dir.into(),
                templates: DashMap::new(),
            }),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Replace the cache with the artifacts currently on disk.
    pub fn load_from_dir(&self) -> Result<usize, TemplateError> {
        let templates = artifact::load_dir(&self.inner.dir)?;
        self.inner.templates.clear();
        for template in templates {
            self.inner
                .templates
                .insert(template.name.clone(), Arc::new(template));
        }

        let count = self.inner.templates.len();
        info!(count, dir = %self.inner.dir.display(), "content templates loaded");
        Ok(count)
    }

    /// Generate, persist and register a template. An existing template of
    /// the same name is replaced.
    pub fn install(&self, name: &str, schema: &Value) -> Result<Arc<GeneratedTemplate>, TemplateError> {
        let template = generate(name, schema)?;
        artifact::persist(&template, &self.inner.dir)?;

        let template = Arc::new(template);
        let replaced = self
            .inner
            .templates
            .insert(template.name.clone(), Arc::clone(&template))
            .is_some();

        info!(
            template = %template.name,
            fields = template.schema.fields.len(),
            replaced,
            "content template installed"
        );
        Ok(template)
    }

    pub fn get(&self, name: &str) -> Option<Arc<GeneratedTemplate>> {
        self.inner.templates.get(name).map(|t| Arc::clone(t.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.templates.contains_key(name)
    }

    /// All templates, sorted by name.
    pub fn list(&self) -> Vec<Arc<GeneratedTemplate>> {
        let mut templates: Vec<_> = self
            .inner
            .templates
            .iter()
            .map(|t| Arc::clone(t.value()))
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        templates
    }

    /// Unregister a template and delete its artifact.
    pub fn remove(&self, name: &str) -> Result<bool, TemplateError> {
        let had_file = artifact::remove(&self.inner.dir, name)?;
        let had_entry = self.inner.templates.remove(name).is_some();
        if had_entry {
            info!(template = %name, "content template removed");
        }
        Ok(had_file || had_entry)
    }

    pub fn len(&self) -> usize {
        self.inner.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.templates.is_empty()
    }
}
