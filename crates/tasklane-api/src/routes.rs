//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::auth::{auth_gate, AuthResponse, LoginRequest, Principal, SignupRequest, UserResponse};
use crate::error::ApiError;
use crate::handlers::{auth, health, tasks, users};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tasklane_core::{SortDirection, TaskSortField, TaskStatus};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(title = "Tasklane API", description = "Session handling and per-user tasks"),
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::refresh_handler,
        auth::logout_handler,
        users::me_handler,
        users::delete_me_handler,
        tasks::list_tasks,
        tasks::get_task,
        tasks::create_task,
        tasks::update_task,
        tasks::delete_task,
        health::health_check,
        health::readiness_check,
        health::metrics,
    ),
    components(schemas(
        ApiError,
        SignupRequest,
        LoginRequest,
        AuthResponse,
        UserResponse,
        Principal,
        tasks::TaskResponse,
        tasks::CreateTaskRequest,
        tasks::UpdateTaskRequest,
        TaskStatus,
        TaskSortField,
        SortDirection,
        health::HealthResponse,
        health::BuildInfo,
        health::ReadinessResponse,
        health::ReadinessChecks,
        health::MetricsResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Signup, login, token refresh and logout"),
        (name = "users", description = "The calling account"),
        (name = "tasks", description = "Per-user tasks"),
        (name = "health", description = "Probes and counters"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn count_requests(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    state.increment_requests();
    next.run(request).await
}

/// Session endpoints; these never pass through the gate
pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refreshtoken", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler))
}

/// Principal-scoped endpoints behind the auth gate
pub fn api_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/users/me",
            get(users::me_handler).delete(users::delete_me_handler),
        )
        .route("/api/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/api/tasks/:id",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route_layer(middleware::from_fn_with_state(Arc::clone(state), auth_gate))
}

/// Probes and counters
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
}

/// Full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(auth_routes())
        .merge(api_routes(&state))
        .merge(health_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), count_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Request timeout and CORS from the server configuration
pub fn with_http_layers(router: Router, server: &tasklane_core::config::ServerConfig) -> Router {
    router
        .layer(TimeoutLayer::new(Duration::from_secs(server.request_timeout_secs)))
        .layer(cors_layer(&server.cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}
