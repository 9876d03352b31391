//! Session and token handling
//!
//! This module provides JWT-based authentication with the following components:
//! - Access token issue and verification (HS512)
//! - Refresh tokens stored as digests, rotated on every use
//! - Bounded revocation registry for logged-out access tokens
//! - Per-caller login rate limiting
//! - Session orchestration and the request gate

pub mod error;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod refresh;
pub mod revocation;
pub mod service;

pub use error::AuthError;
pub use jwt::{Claims, IssuedToken, TokenCodec, TokenError};
pub use middleware::{auth_gate, bearer_token, request_context};
pub use models::{AuthResponse, LoginRequest, Principal, SignupRequest, UserResponse};
pub use rate_limit::LoginRateLimiter;
pub use refresh::{IssuedRefreshToken, RefreshTokenService};
pub use revocation::RevocationRegistry;
pub use service::{HousekeepingReport, LogoutOutcome, SessionService};
