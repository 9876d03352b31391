//! Session error taxonomy
//!
//! Authentication failures are told apart here for logging and auditing. At
//! the HTTP boundary every one of them collapses into the same 401.

use super::jwt::TokenError;
use std::time::Duration;
use tasklane_core::password::PasswordError;
use tasklane_core::{ConfigError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account is disabled")]
    AccountDisabled,

    #[error("too many login attempts, retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("refresh token is not recognised")]
    InvalidRefreshToken,

    #[error("refresh token has expired")]
    RefreshTokenExpired,

    #[error("access token rejected: {0}")]
    Token(#[from] TokenError),

    #[error("access token has been revoked")]
    TokenRevoked,

    #[error("authentication required")]
    Unauthenticated,

    #[error("username already exists: {0}")]
    DuplicateUsername(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable name for logs and audit records
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountDisabled => "account_disabled",
            Self::RateLimited { .. } => "rate_limited",
            Self::InvalidRefreshToken => "invalid_refresh_token",
            Self::RefreshTokenExpired => "refresh_token_expired",
            Self::Token(TokenError::Malformed) => "token_malformed",
            Self::Token(TokenError::BadSignature) => "token_bad_signature",
            Self::Token(TokenError::Expired) => "token_expired",
            Self::Token(TokenError::Unsupported) => "token_unsupported",
            Self::Token(TokenError::Signing(_)) => "token_signing",
            Self::TokenRevoked => "token_revoked",
            Self::Unauthenticated => "unauthenticated",
            Self::DuplicateUsername(_) => "duplicate_username",
            Self::Validation(_) => "validation",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the failure says the caller is not who they claim
    pub fn is_authentication_failure(&self) -> bool {
        match self {
            Self::Token(TokenError::Signing(_)) => false,
            Self::InvalidCredentials
            | Self::AccountDisabled
            | Self::InvalidRefreshToken
            | Self::RefreshTokenExpired
            | Self::Token(_)
            | Self::TokenRevoked
            | Self::Unauthenticated => true,
            _ => false,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate {
                entity: "user",
                key,
            } => Self::DuplicateUsername(key),
            StoreError::Unavailable(_) | StoreError::Timeout(_) => {
                Self::StoreUnavailable(err.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        Self::Internal(err.to_string())
    }
}
