//! Command-line interface for the `blogging` binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::models::NewUser;
use crate::store::{ContentStore, PgContentStore};
use crate::template::{artifact, generate};

/// Blogging module server and maintenance commands.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Run the HTTP server (default).
    Serve,

    /// Apply database migrations and exit.
    Migrate,

    /// Create a user account.
    CreateUser {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        mail: String,

        #[arg(long)]
        password: String,

        /// Grant administrator rights.
        #[arg(long)]
        admin: bool,
    },

    /// Content template tools.
    Template {
        #[command(subcommand)]
        command: TemplateCommand,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum TemplateCommand {
    /// Generate a template artifact from a JSON or YAML schema file.
    Generate {
        #[arg(long)]
        name: String,

        #[arg(long)]
        schema: PathBuf,

        /// Output directory (default: GENERATED_TEMPLATES_DIR).
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

impl Cli {
    /// The subcommand to run, `serve` when none was given.
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Serve)
    }
}

/// Apply migrations against `DATABASE_URL`.
pub async fn migrate(config: &Config) -> Result<()> {
    let pool = db::create_pool(config.require_database_url()?, config.database_max_connections)
        .await?;
    db::run_migrations(&pool).await?;
    info!("database migrations applied");
    Ok(())
}

/// Create a user in PostgreSQL.
pub async fn create_user(
    config: &Config,
    name: &str,
    mail: &str,
    password: &str,
    admin: bool,
) -> Result<()> {
    let pool = db::create_pool(config.require_database_url()?, config.database_max_connections)
        .await?;
    db::run_migrations(&pool).await?;

    let store = PgContentStore::new(pool);
    let user = store
        .create_user(NewUser::with_password(name, mail, password, admin)?)
        .await
        .with_context(|| format!("failed to create user '{name}'"))?;
    info!(user_id = %user.id, name = %user.name, admin = user.is_admin, "user created");
    Ok(())
}

/// Read a schema file. `.yaml`/`.yml` files are YAML, everything else JSON.
pub fn read_schema(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let value = if is_yaml {
        serde_yml::from_str(&raw).context("schema file is not valid YAML")?
    } else {
        serde_json::from_str(&raw).context("schema file is not valid JSON")?
    };
    Ok(value)
}

/// Generate a template artifact without a running server.
///
/// Returns the path written. A running server picks the artifact up on its
/// next start.
pub fn generate_template(name: &str, schema: &Path, out: &Path) -> Result<PathBuf> {
    let input = read_schema(schema)?;
    let template = generate(name, &input).context("template generation failed")?;
    let path = artifact::persist(&template, out)?;
    info!(
        template = %template.name,
        fields = template.schema.fields.len(),
        path = %path.display(),
        "template artifact written"
    );
    Ok(path)
}
