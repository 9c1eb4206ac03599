//! User model and password handling.
//!
//! Accounts belong to the surrounding application; the blog only resolves
//! authors, checks passwords for session login and creates accounts from the
//! CLI.

use anyhow::Result;
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing)]
    pub pass: String,
    pub mail: String,
    pub is_admin: bool,
    pub created: DateTime<Utc>,
    pub status: i16,
}

/// Input for creating a new user. `pass` is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub pass: String,
    pub mail: String,
    pub is_admin: bool,
}

impl NewUser {
    /// Build a new user, hashing the plaintext password with Argon2id.
    pub fn with_password(name: &str, mail: &str, password: &str, is_admin: bool) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            pass: hash_password(password)?,
            mail: mail.to_string(),
            is_admin,
        })
    }
}

impl User {
    /// Check if this user is active.
    pub fn is_active(&self) -> bool {
        self.status == 1
    }

    /// Verify a password against this user's hash.
    pub fn verify_password(&self, password: &str) -> bool {
        if self.pass.is_empty() {
            return false;
        }

        let Ok(parsed_hash) = PasswordHash::new(&self.pass) else {
            return false;
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String> {
    hash_password_with(&Argon2::default(), password)
}

/// Hash a password with explicit Argon2 parameters.
pub fn hash_password_with(argon2: &Argon2<'_>, password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;

    Ok(hash.to_string())
}
