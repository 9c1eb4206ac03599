//! Session management.
//!
//! Sessions live in Redis when `REDIS_URL` is set, otherwise in process
//! memory.

use anyhow::{Context, Result};
use fred::prelude::*;
use tower_sessions::cookie::SameSite;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, SessionStore};
use tower_sessions_redis_store::RedisStore;

/// Default session expiry (24 hours).
pub const DEFAULT_SESSION_EXPIRY_HOURS: i64 = 24;

/// Parse a `COOKIE_SAME_SITE` value. Unknown values fall back to strict.
pub fn parse_same_site(value: &str) -> SameSite {
    match value.trim().to_ascii_lowercase().as_str() {
        "lax" => SameSite::Lax,
        "none" => SameSite::None,
        _ => SameSite::Strict,
    }
}

fn configure<S: SessionStore>(store: S, same_site: SameSite, secure: bool) -> SessionManagerLayer<S> {
    SessionManagerLayer::new(store)
        .with_secure(secure)
        .with_http_only(true)
        .with_same_site(same_site)
        .with_expiry(Expiry::OnInactivity(Duration::hours(DEFAULT_SESSION_EXPIRY_HOURS)))
}

/// Create the session layer using Redis as the backend.
pub async fn redis_session_layer(
    redis_url: &str,
    same_site: SameSite,
) -> Result<SessionManagerLayer<RedisStore<Pool>>> {
    let config = Config::from_url(redis_url).context("failed to parse Redis URL")?;

    let pool = Builder::from_config(config)
        .build_pool(1)
        .context("failed to create Redis pool")?;

    pool.init()
        .await
        .context("failed to connect to Redis for sessions")?;

    Ok(configure(RedisStore::new(pool), same_site, true))
}

/// Create an in-memory session layer. Sessions do not survive a restart.
pub fn memory_session_layer(same_site: SameSite) -> SessionManagerLayer<MemoryStore> {
    configure(MemoryStore::default(), same_site, false)
}
