//! Opaque refresh tokens
//!
//! A refresh token is 256 random bits, URL-safe base64 encoded. Only its
//! SHA-256 digest reaches the store.

use base64::Engine;
use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tasklane_core::{DocumentStore, RefreshToken, RefreshTokenStore, StoreError, StoreResult};
use uuid::Uuid;

/// A token as handed to the client, with its persisted record
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub record: RefreshToken,
}

/// Issues, resolves and retires refresh tokens
pub struct RefreshTokenService {
    store: Arc<dyn DocumentStore>,
    ttl: Duration,
}

impl RefreshTokenService {
    pub fn new(store: Arc<dyn DocumentStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint and persist a new token for `username`
    ///
    /// Existing tokens of the user are left alone.
    pub async fn issue(&self, username: &str) -> StoreResult<IssuedRefreshToken> {
        let token = generate_refresh_token();
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let record = RefreshToken {
            id: Uuid::new_v4(),
            token_hash: hash_token(&token),
            username: username.to_string(),
            expires_at: now + ttl,
            created_at: now,
        };
        self.store.save_refresh_token(&record).await?;

        Ok(IssuedRefreshToken { token, record })
    }

    pub async fn find(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        self.store.find_by_token_hash(&hash_token(token)).await
    }

    /// Delete one token; `true` if this call removed it
    pub async fn delete(&self, token: &str) -> StoreResult<bool> {
        self.store.delete_by_token_hash(&hash_token(token)).await
    }

    pub async fn delete_by_username(&self, username: &str) -> StoreResult<u64> {
        self.store.delete_by_username(username).await
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.store.delete_expired(now).await
    }
}

/// 32 random bytes, URL-safe base64 without padding
pub fn generate_refresh_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex SHA-256 of a token
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
