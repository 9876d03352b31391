//! Session endpoints: signup, login, refresh and logout
//!
//! Author: hephaex@gmail.com

use crate::auth::{
    bearer_token, request_context, AuthError, AuthResponse, LoginRequest, SignupRequest,
    UserResponse,
};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;

/// Register a new user account
///
/// New users are active and carry the default role.
///
/// # Responses
///
/// * `201 Created` - User registered
/// * `400 Bad Request` - Invalid input or username already taken
#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User registered successfully", body = UserResponse),
        (status = 400, description = "Invalid input or duplicate username", body = crate::error::ApiError),
        (status = 503, description = "Store unavailable", body = crate::error::ApiError),
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = request_context(&state, &headers, peer.as_ref());
    let user = state.sessions.signup(&ctx, request).await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// Login with username and password
///
/// Attempts are throttled per caller before credentials are looked at.
/// Unknown users, wrong passwords and disabled accounts all answer 401.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 429, description = "Too many attempts; see Retry-After", body = crate::error::ApiError),
        (status = 503, description = "Store unavailable", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let ctx = request_context(&state, &headers, peer.as_ref());
    let response = state
        .sessions
        .login(&ctx, &request.username, &request.password)
        .await?;

    Ok(Json(response))
}

/// Exchange a refresh token for a new token pair
///
/// The refresh token travels as `Authorization: Bearer <refresh token>` and
/// is single use: the pair returned replaces it.
#[utoipa::path(
    post,
    path = "/auth/refreshtoken",
    tag = "auth",
    responses(
        (status = 200, description = "Tokens rotated", body = AuthResponse),
        (status = 401, description = "Unknown, used or expired refresh token", body = crate::error::ApiError),
        (status = 503, description = "Store unavailable", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Result<Json<AuthResponse>, AppError> {
    let token = bearer_token(&headers).ok_or(AuthError::InvalidRefreshToken)?;
    let ctx = request_context(&state, &headers, peer.as_ref());
    let response = state.sessions.refresh(&ctx, token).await?;

    Ok(Json(response))
}

/// Logout
///
/// Revokes the presented access token and deletes the user's refresh tokens.
/// Always answers 204, also without a token or with one already revoked.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses(
        (status = 204, description = "Logged out"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> StatusCode {
    let ctx = request_context(&state, &headers, peer.as_ref());
    state.sessions.logout(&ctx, bearer_token(&headers)).await;

    StatusCode::NO_CONTENT
}
