//! CSRF token generation and verification.
//!
//! Tokens live in the session. Each one is single-use and expires after an
//! hour; a session keeps at most [`MAX_TOKENS`] outstanding.

use anyhow::{Context, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tower_sessions::Session;

/// Session key for storing CSRF tokens.
const CSRF_SESSION_KEY: &str = "csrf_tokens";

/// Maximum number of tokens to store per session.
pub const MAX_TOKENS: usize = 10;

/// Token validity period in seconds.
const TOKEN_VALIDITY_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IssuedToken {
    token: String,
    issued: i64,
}

impl IssuedToken {
    fn is_fresh(&self, now: i64) -> bool {
        now - self.issued <= TOKEN_VALIDITY_SECS
    }
}

async fn load(session: &Session) -> Vec<IssuedToken> {
    session
        .get(CSRF_SESSION_KEY)
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
}

/// Generate a CSRF token and store it in the session.
pub async fn generate_csrf_token(session: &Session) -> Result<String> {
    let mut random_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    let issued = chrono::Utc::now().timestamp();

    let mut hasher = Sha256::new();
    hasher.update(random_bytes);
    hasher.update(issued.to_le_bytes());
    let token = hex::encode(hasher.finalize());

    let mut tokens = load(session).await;
    tokens.retain(|t| t.is_fresh(issued));
    tokens.push(IssuedToken {
        token: token.clone(),
        issued,
    });
    if tokens.len() > MAX_TOKENS {
        tokens.drain(..tokens.len() - MAX_TOKENS);
    }

    session
        .insert(CSRF_SESSION_KEY, tokens)
        .await
        .context("failed to store CSRF token")?;

    Ok(token)
}

/// Verify and consume a submitted token.
pub async fn verify_csrf_token(session: &Session, submitted: &str) -> Result<bool> {
    if submitted.is_empty() {
        return Ok(false);
    }

    let mut tokens = load(session).await;
    let now = chrono::Utc::now().timestamp();
    let Some(index) = tokens
        .iter()
        .position(|t| t.token == submitted && t.is_fresh(now))
    else {
        return Ok(false);
    };

    tokens.remove(index);
    tokens.retain(|t| t.is_fresh(now));
    session
        .insert(CSRF_SESSION_KEY, tokens)
        .await
        .context("failed to update CSRF tokens")?;

    Ok(true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn tokens_are_single_use() {
        let session = session();
        let token = generate_csrf_token(&session).await.unwrap();
        assert_eq!(token.len(), 64);

        assert!(verify_csrf_token(&session, &token).await.unwrap());
        assert!(!verify_csrf_token(&session, &token).await.unwrap());
        assert!(!verify_csrf_token(&session, "").await.unwrap());
        assert!(!verify_csrf_token(&session, "forged").await.unwrap());
    }

    #[tokio::test]
    async fn oldest_tokens_are_pruned() {
        let session = session();
        let first = generate_csrf_token(&session).await.unwrap();
        for _ in 0..MAX_TOKENS {
            generate_csrf_token(&session).await.unwrap();
        }
        assert!(!verify_csrf_token(&session, &first).await.unwrap());
    }
}
