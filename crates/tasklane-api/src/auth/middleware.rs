//! Authentication gate for protected routes
//!
//! Requests without a bearer token pass through untouched; handlers that need
//! an identity take [`Principal`] as an extractor and answer 401 when it is
//! missing. A presented token must be unrevoked, verify, and name a live,
//! active user, otherwise the request stops here with 401.

use super::error::AuthError;
use super::models::Principal;
use crate::audit::{audit_log, AuditEvent, RequestContext};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Token from `Authorization: Bearer <token>`
///
/// Exactly one space after the scheme; an empty token counts as absent.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
}

/// Caller context of a request
///
/// Keyed by the socket peer; proxy headers count only when the peer is one of
/// `server.trusted_proxies`.
pub fn request_context(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<&ConnectInfo<SocketAddr>>,
) -> RequestContext {
    RequestContext::from_parts(
        headers,
        peer.map(|ConnectInfo(addr)| *addr),
        &state.config.server.trusted_proxies,
    )
}

/// Gate middleware, installed with `axum::middleware::from_fn_with_state`
pub async fn auth_gate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = bearer_token(request.headers()).map(str::to_owned) else {
        return Ok(next.run(request).await);
    };

    match state.sessions.authenticate(&token).await {
        Ok(principal) => {
            debug!(username = %principal.username, "Request authenticated");
            request.extensions_mut().insert(principal);
            Ok(next.run(request).await)
        }
        Err(err) => {
            if err.is_authentication_failure() {
                let ctx = request_context(
                    &state,
                    request.headers(),
                    request.extensions().get::<ConnectInfo<SocketAddr>>(),
                );
                audit_log(&AuditEvent::InvalidToken {
                    reason: err.kind().to_string(),
                    ip_address: ctx.ip_address,
                    user_agent: ctx.user_agent,
                });
            }
            Err(AppError::from(err))
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| AppError::from(AuthError::Unauthenticated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic YWxpY2U6"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn test_missing_principal_is_rejected() {
        let (mut parts, _) = axum::http::Request::new(()).into_parts();
        let result = Principal::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }
}
