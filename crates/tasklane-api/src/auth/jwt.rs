//! JWT access token signing and verification
//!
//! Access tokens are HS512-signed JWTs whose subject is the username. The
//! signing key is either configured or generated once per process, and lives
//! only in memory. A token is valid strictly before its `exp` second; there is
//! no leeway.

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tasklane_core::AuthConfig;
use thiserror::Error;
use uuid::Uuid;

const ALGORITHM: Algorithm = Algorithm::HS512;

/// Size of a generated signing key in bytes
pub const GENERATED_SECRET_LEN: usize = 64;

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - username
    pub sub: String,
    /// Unique token id; two tokens minted in the same second still differ
    pub jti: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiry (Unix seconds)
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Token verification failures
///
/// The variants are kept apart for logs only; every one of them is a 401.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("unsupported token algorithm")]
    Unsupported,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Access token minted for a subject
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Signs and verifies access tokens
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    access_ttl: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8], issuer: impl Into<String>, access_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            access_ttl,
        }
    }

    /// Build from configuration, generating a key when none is configured
    pub fn from_config(config: &AuthConfig) -> Self {
        let ttl = Duration::from_secs(config.access_token_ttl_secs);
        match &config.jwt_secret {
            Some(secret) => Self::new(secret.as_bytes(), &config.issuer, ttl),
            None => Self::new(&generate_secret(), &config.issuer, ttl),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Sign a token for `subject` expiring at `expires_at`
    pub fn issue(&self, subject: &str, expires_at: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken { token, claims })
    }

    /// Sign an access token with the configured lifetime
    pub fn issue_access(&self, subject: &str) -> Result<IssuedToken, TokenError> {
        let ttl = chrono::Duration::from_std(self.access_ttl)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        self.issue(subject, Utc::now() + ttl)
    }

    /// Verify against the current time
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify against `now` (Unix seconds)
    ///
    /// The signature is checked before expiry, so a forged token never
    /// reports `Expired`.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        // Expiry is enforced below, without leeway.
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                    TokenError::Unsupported
                }
                _ => TokenError::Malformed,
            }
        })?;

        if now >= data.claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }
}

/// Fresh random signing key
pub fn generate_secret() -> Vec<u8> {
    let mut secret = vec![0u8; GENERATED_SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}
