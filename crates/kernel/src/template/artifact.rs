//! Generated template artifacts on disk.
//!
//! Each template lives in `<dir>/<name>.yml`. Files are written to a temporary
//! sibling and renamed into place, so readers never see a partial artifact.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::TemplateError;
use super::generator::{GeneratedTemplate, build};
use super::schema::validate_identifier;

const EXTENSION: &str = "yml";

/// Path of the artifact for `name`. The name must be a valid identifier.
pub fn artifact_path(dir: &Path, name: &str) -> Result<PathBuf, TemplateError> {
    validate_identifier(name).map_err(|e| TemplateError::Invalid(vec![format!("template {e}")]))?;
    Ok(dir.join(format!("{name}.{EXTENSION}")))
}

/// Write a template artifact, replacing any previous version.
pub fn persist(template: &GeneratedTemplate, dir: &Path) -> Result<PathBuf, TemplateError> {
    let path = artifact_path(dir, &template.name)?;
    fs::create_dir_all(dir)?;

    let yaml = serde_yml::to_string(template)?;
    let tmp = dir.join(format!(".{}.{EXTENSION}.tmp", template.name));
    fs::write(&tmp, yaml)?;
    fs::rename(&tmp, &path)?;

    debug!(template = %template.name, path = %path.display(), "template artifact written");
    Ok(path)
}

/// Read every artifact in `dir`, creating the directory if it is missing.
///
/// Artifacts that fail to parse, or whose checksum no longer matches their
/// schema, are skipped with a warning. Only the schema is trusted: the form
/// and model are regenerated from it.
pub fn load_dir(dir: &Path) -> Result<Vec<GeneratedTemplate>, TemplateError> {
    fs::create_dir_all(dir)?;

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file() && path.extension().is_some_and(|ext| ext == EXTENSION)
        })
        .collect();
    paths.sort();

    let mut templates = Vec::with_capacity(paths.len());
    for path in paths {
        match read_artifact(&path) {
            Ok(template) => templates.push(template),
            Err(reason) => {
                warn!(path = %path.display(), reason = %reason, "skipping template artifact");
            }
        }
    }

    Ok(templates)
}

fn read_artifact(path: &Path) -> Result<GeneratedTemplate, String> {
    let contents = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let template: GeneratedTemplate =
        serde_yml::from_str(&contents).map_err(|e| format!("parse error: {e}"))?;

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    if stem != template.name {
        return Err(format!(
            "file name does not match template name '{}'",
            template.name
        ));
    }
    if !template.verify() {
        return Err("checksum mismatch".to_string());
    }

    let generated_at = template.generated_at;
    let mut rebuilt = build(&template.name, template.schema).map_err(|e| e.to_string())?;
    rebuilt.generated_at = generated_at;
    Ok(rebuilt)
}

/// Delete the artifact for `name`. Returns false if there was none.
pub fn remove(dir: &Path, name: &str) -> Result<bool, TemplateError> {
    let path = artifact_path(dir, name)?;
    match fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
