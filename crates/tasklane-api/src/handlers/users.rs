//! Current-user endpoints
//!
//! Author: hephaex@gmail.com

use crate::auth::{bearer_token, request_context, Principal};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;

/// Principal of the calling request
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Authenticated principal", body = Principal),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn me_handler(principal: Principal) -> Json<Principal> {
    Json(principal)
}

/// Delete the calling account
///
/// Removes the user with all of its tasks and refresh tokens and revokes the
/// access token used for the call.
#[utoipa::path(
    delete,
    path = "/api/users/me",
    tag = "users",
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 503, description = "Store unavailable", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_me_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Result<StatusCode, AppError> {
    let ctx = request_context(&state, &headers, peer.as_ref());
    state
        .sessions
        .delete_account(&ctx, &principal, bearer_token(&headers))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
