//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL. Required to serve or migrate.
    pub database_url: Option<String>,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Redis connection URL for the session store. When None, sessions are
    /// kept in process memory.
    pub redis_url: Option<String>,

    /// Directory holding generated template artifacts (default: ./generated).
    pub generated_dir: PathBuf,

    /// Optional directory of Tera templates overriding the embedded ones.
    pub templates_dir: Option<PathBuf>,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,

    /// Cookie SameSite policy: "strict", "lax", or "none" (default: "strict").
    pub cookie_same_site: String,

    /// Blog behaviour shared with handlers.
    pub blog: BlogSettings,
}

/// Settings that change how the blog behaves, not how it is wired.
#[derive(Debug, Clone)]
pub struct BlogSettings {
    /// Gate visibility on publish/pin policies. When false, the per-entry
    /// `is_active` flag decides publication and pinning is unavailable.
    pub use_policy: bool,

    /// Entries per index page.
    pub page_size: usize,

    /// Public site URL, used for hyperlinks in API representations.
    pub site_url: String,
}

impl Default for BlogSettings {
    fn default() -> Self {
        Self {
            use_policy: true,
            page_size: 10,
            site_url: "http://localhost:3000".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// `from_env` is a thin wrapper; tests pass a map instead of mutating the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url = lookup("DATABASE_URL").filter(|v| !v.is_empty());

        let database_max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let redis_url = lookup("REDIS_URL").filter(|v| !v.is_empty());

        let generated_dir = lookup("GENERATED_TEMPLATES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./generated"));

        let templates_dir = lookup("TEMPLATES_DIR").map(PathBuf::from);

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|| vec!["*".to_string()]);

        let cookie_same_site = lookup("COOKIE_SAME_SITE")
            .unwrap_or_else(|| "strict".to_string())
            .to_lowercase();

        let use_policy = match lookup("BLOG_USE_POLICY") {
            Some(v) => parse_bool(&v).context("BLOG_USE_POLICY must be a boolean")?,
            None => true,
        };

        let page_size: usize = lookup("BLOG_PAGE_SIZE")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .context("BLOG_PAGE_SIZE must be a positive integer")?;
        if page_size == 0 {
            bail!("BLOG_PAGE_SIZE must be a positive integer");
        }

        let site_url = lookup("SITE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            redis_url,
            generated_dir,
            templates_dir,
            cors_allowed_origins,
            cookie_same_site,
            blog: BlogSettings {
                use_policy,
                page_size,
                site_url,
            },
        })
    }

    /// The database URL, or an error naming the missing variable.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL environment variable is required")
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("invalid boolean '{other}'"),
    }
}
