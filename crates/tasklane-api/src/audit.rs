//! Security audit logging for session events
//!
//! Every login, refresh, logout, registration and gate rejection produces an
//! [`AuditEvent`] logged on the `"audit"` target, so security logs can be
//! routed apart from application logs. Events never carry passwords or
//! tokens.
//!
//! ```ignore
//! use tasklane_api::audit::{audit_log, AuditEvent};
//!
//! audit_log(&AuditEvent::LoginSuccess {
//!     username: "alice".to_string(),
//!     ip_address: Some("192.168.1.1".to_string()),
//!     user_agent: None,
//! });
//! ```
//!
//! Author: hephaex@gmail.com

use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use tracing::{info, warn};
use uuid::Uuid;

/// Caller key used when no address can be determined
pub const UNKNOWN_CALLER: &str = "unknown";

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Successful login
    LoginSuccess {
        username: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Failed login; `reason` is the internal error kind
    LoginFailure {
        username: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Login refused before credentials were checked
    LoginRateLimited {
        caller: String,
        retry_after_secs: u64,
    },

    /// Logout; `refresh_tokens_deleted` is `None` when the store call failed
    Logout {
        username: String,
        refresh_tokens_deleted: Option<u64>,
        ip_address: Option<String>,
    },

    /// Refresh token exchanged for a new pair
    TokenRefresh {
        username: String,
        ip_address: Option<String>,
    },

    /// Refresh token refused
    RefreshRejected {
        reason: String,
        ip_address: Option<String>,
    },

    /// New account
    RegistrationSuccess {
        user_id: Uuid,
        username: String,
        ip_address: Option<String>,
    },

    /// Refused account creation
    RegistrationFailure {
        username: String,
        reason: String,
        ip_address: Option<String>,
    },

    /// Gate rejected an access token
    InvalidToken {
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Account removed by its owner
    AccountDeleted {
        user_id: Uuid,
        username: String,
        ip_address: Option<String>,
    },
}

/// Log a security audit event
///
/// The event is serialized to JSON alongside a few indexed fields, e.g.
///
/// ```json
/// {"event_type":"login_failure","username":"alice","reason":"invalid_credentials",
///  "ip_address":"192.168.1.1","user_agent":null}
/// ```
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    match event {
        AuditEvent::LoginSuccess {
            username,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                username = %username,
                ip_address = ?ip_address,
                "Login successful"
            );
        }
        AuditEvent::LoginFailure {
            username,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                username = %username,
                reason = %reason,
                ip_address = ?ip_address,
                "Login failed"
            );
        }
        AuditEvent::LoginRateLimited {
            caller,
            retry_after_secs,
        } => {
            warn!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                caller = %caller,
                retry_after_secs = %retry_after_secs,
                "Login rate limited"
            );
        }
        AuditEvent::Logout {
            username,
            refresh_tokens_deleted,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                username = %username,
                refresh_tokens_deleted = ?refresh_tokens_deleted,
                ip_address = ?ip_address,
                "User logout"
            );
        }
        AuditEvent::TokenRefresh {
            username,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                username = %username,
                ip_address = ?ip_address,
                "Token refresh"
            );
        }
        AuditEvent::RefreshRejected { reason, ip_address } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                reason = %reason,
                ip_address = ?ip_address,
                "Refresh rejected"
            );
        }
        AuditEvent::RegistrationSuccess {
            user_id,
            username,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                username = %username,
                ip_address = ?ip_address,
                "Registration successful"
            );
        }
        AuditEvent::RegistrationFailure {
            username,
            reason,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                username = %username,
                reason = %reason,
                ip_address = ?ip_address,
                "Registration failed"
            );
        }
        AuditEvent::InvalidToken {
            reason, ip_address, ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                reason = %reason,
                ip_address = ?ip_address,
                "Invalid token"
            );
        }
        AuditEvent::AccountDeleted {
            user_id,
            username,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                username = %username,
                ip_address = ?ip_address,
                "Account deleted"
            );
        }
    }
}

/// Who is calling, as far as the request tells
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Client address: the socket peer, or the forwarded client when the
    /// peer is a trusted proxy
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Resolve the caller of a request
    ///
    /// Forwarding headers are only read when `peer` is one of
    /// `trusted_proxies`; anyone else could put any address in them.
    pub fn from_parts(
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        trusted_proxies: &[IpAddr],
    ) -> Self {
        let client = peer.map(|peer| {
            let peer = peer.ip();
            if trusted_proxies.contains(&peer) {
                forwarded_client(headers, trusted_proxies).unwrap_or(peer)
            } else {
                peer
            }
        });

        Self {
            ip_address: client.map(|ip| ip.to_string()),
            user_agent: extract_user_agent(headers),
        }
    }

    /// Key of the caller's login rate bucket
    pub fn caller_key(&self) -> &str {
        self.ip_address.as_deref().unwrap_or(UNKNOWN_CALLER)
    }
}

/// Client address named by proxy headers
///
/// Walks X-Forwarded-For from the right and returns the first hop that is
/// not a trusted proxy; hops further left were written by the client and
/// prove nothing. Without X-Forwarded-For, X-Real-IP is used.
pub fn forwarded_client(headers: &HeaderMap, trusted_proxies: &[IpAddr]) -> Option<IpAddr> {
    if let Some(xff) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        let mut leftmost = None;
        for hop in xff.rsplit(',').map(str::trim).filter(|hop| !hop.is_empty()) {
            let ip: IpAddr = hop.parse().ok()?;
            if !trusted_proxies.contains(&ip) {
                return Some(ip);
            }
            leftmost = Some(ip);
        }
        return leftmost;
    }

    headers
        .get("x-real-ip")
        .and_then(|ip| ip.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok())
}

/// Extract user agent from request headers
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
