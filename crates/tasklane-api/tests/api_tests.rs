//! API Integration Tests
//!
//! Drive the full router over an in-memory store.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tasklane_api::state::AppState;
use tasklane_api::{create_router, create_router_for_testing, create_router_with_store, test_config};
use tasklane_core::{
    CredentialStore, DocumentStore, RefreshToken, RefreshTokenStore, StoreError, StoreResult,
    Task, TaskQuery, TaskStore, User,
};
use tasklane_store::MemoryStore;
use tower::ServiceExt;
use uuid::Uuid;

/// Helper to create a test request
fn create_json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Request carrying `Authorization: Bearer <token>`
fn bearer_request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let mut request = create_json_request(method, uri, body);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    request
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn signup(app: &Router, username: &str, password: &str) -> Response {
    send(
        app,
        create_json_request(
            "POST",
            "/auth/signup",
            Some(json!({ "username": username, "password": password })),
        ),
    )
    .await
}

async fn login(app: &Router, username: &str, password: &str) -> Response {
    send(
        app,
        create_json_request(
            "POST",
            "/auth/login",
            Some(json!({ "username": username, "password": password })),
        ),
    )
    .await
}

/// Sign up and log in, returning (access token, refresh token)
async fn session(app: &Router, username: &str) -> (String, String) {
    assert_eq!(signup(app, username, "secret").await.status(), StatusCode::CREATED);
    let response = login(app, username, "secret").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    (
        json["accessToken"].as_str().unwrap().to_string(),
        json["refreshToken"].as_str().unwrap().to_string(),
    )
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    let response = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["build_info"]["store_backend"], "memory");
}

#[tokio::test]
async fn test_readiness_check() {
    let app = create_router_for_testing();

    let response = send(
        &app,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"]["store"], true);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = create_router_for_testing();

    let response = send(
        &app,
        Request::builder().uri("/metrics").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["uptime_seconds"].is_number());
    assert!(json["total_requests"].as_u64().unwrap() >= 1);
    assert_eq!(json["revoked_tokens"], 0);
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
async fn test_full_session_scenario() {
    let app = create_router_for_testing();

    let response = signup(&app, "alice", "secret").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let user = body_json(response).await;
    assert_eq!(user["username"], "alice");
    assert_eq!(user["roles"], json!(["ROLE_USER"]));
    assert!(user.get("passwordHash").is_none());

    let response = login(&app, "alice", "secret").await;
    assert_eq!(response.status(), StatusCode::OK);
    let tokens = body_json(response).await;
    assert_eq!(tokens["tokenType"], "Bearer");
    assert_eq!(tokens["expiresIn"], 900);
    let access = tokens["accessToken"].as_str().unwrap();
    let refresh = tokens["refreshToken"].as_str().unwrap();

    let response = send(&app, bearer_request("GET", "/api/users/me", access, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["username"], "alice");

    let response = send(&app, bearer_request("POST", "/auth/logout", access, None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, bearer_request("GET", "/api/users/me", access, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, bearer_request("POST", "/auth/refreshtoken", refresh, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signup_duplicate_username() {
    let app = create_router_for_testing();

    assert_eq!(signup(&app, "alice", "secret").await.status(), StatusCode::CREATED);

    let response = signup(&app, "alice", "different").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_signup_invalid_input() {
    let app = create_router_for_testing();

    assert_eq!(signup(&app, "al", "secret").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(signup(&app, "alice", "short").await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_failures_look_alike() {
    let app = create_router_for_testing();
    signup(&app, "alice", "secret").await;

    let wrong_password = login(&app, "alice", "not-it").await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    let wrong_password = body_json(wrong_password).await;

    let unknown_user = login(&app, "mallory", "secret").await;
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
    let unknown_user = body_json(unknown_user).await;

    assert_eq!(wrong_password, unknown_user);
}

/// Login from `peer`, optionally claiming another client via X-Forwarded-For
fn login_from(peer: &str, forwarded_for: Option<&str>) -> Request<Body> {
    let mut request = create_json_request(
        "POST",
        "/auth/login",
        Some(json!({ "username": "alice", "password": "secret" })),
    );
    request
        .extensions_mut()
        .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
    if let Some(forwarded_for) = forwarded_for {
        request
            .headers_mut()
            .insert("x-forwarded-for", forwarded_for.parse().unwrap());
    }
    request
}

#[tokio::test]
async fn test_login_rate_limited_per_caller() {
    let app = create_router_for_testing();
    signup(&app, "alice", "secret").await;

    for _ in 0..5 {
        let response = send(&app, login_from("203.0.113.7:40000", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Same address, new source port: still the same caller.
    let response = send(&app, login_from("203.0.113.7:40001", None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(body_json(response).await["retryAfterSecs"], retry_after);

    // Another caller has its own bucket.
    let response = send(&app, login_from("198.51.100.4:40000", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forwarded_for_does_not_escape_login_limit() {
    let app = create_router_for_testing();
    signup(&app, "alice", "secret").await;

    let mut statuses = Vec::new();
    for i in 0..20 {
        let spoofed = format!("10.0.0.{i}");
        let response = send(&app, login_from("198.51.100.9:40000", Some(&spoofed))).await;
        statuses.push(response.status());
    }

    assert!(statuses[..5].iter().all(|s| *s == StatusCode::OK));
    assert!(statuses[5..]
        .iter()
        .all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn test_trusted_proxy_limits_forwarded_clients() {
    let mut config = test_config();
    config.server.trusted_proxies = vec!["10.0.0.2".parse().unwrap()];
    let state = AppState::build(config, Arc::new(MemoryStore::new())).unwrap();
    let app = create_router(Arc::new(state));
    signup(&app, "alice", "secret").await;

    // The client cannot push a fake hop past the proxy's own entry.
    for i in 0..5 {
        let chain = format!("192.0.2.{i}, 203.0.113.7");
        let response = send(&app, login_from("10.0.0.2:5000", Some(&chain))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = send(&app, login_from("10.0.0.2:5000", Some("203.0.113.7"))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Other clients behind the same proxy are unaffected.
    let response = send(&app, login_from("10.0.0.2:5000", Some("203.0.113.8"))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let app = create_router_for_testing();
    let (_, refresh) = session(&app, "alice").await;

    let response = send(&app, bearer_request("POST", "/auth/refreshtoken", &refresh, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = body_json(response).await;
    let new_access = rotated["accessToken"].as_str().unwrap();
    let new_refresh = rotated["refreshToken"].as_str().unwrap();
    assert_ne!(new_refresh, refresh);

    // The old token was consumed by the rotation.
    let response = send(&app, bearer_request("POST", "/auth/refreshtoken", &refresh, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, bearer_request("POST", "/auth/refreshtoken", new_refresh, None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, bearer_request("GET", "/api/users/me", new_access, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_without_token() {
    let app = create_router_for_testing();

    let response = send(&app, create_json_request("POST", "/auth/refreshtoken", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, bearer_request("POST", "/auth/refreshtoken", "made-up", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let app = create_router_for_testing();
    let (access, _) = session(&app, "alice").await;

    for _ in 0..2 {
        let response = send(&app, bearer_request("POST", "/auth/logout", &access, None)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let response = send(&app, bearer_request("GET", "/api/users/me", &access, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_usable_token() {
    let app = create_router_for_testing();

    let response = send(&app, create_json_request("POST", "/auth/logout", None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, bearer_request("POST", "/auth/logout", "garbage", None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_protected_route_without_auth_returns_401() {
    let app = create_router_for_testing();

    let response = send(&app, create_json_request("GET", "/api/users/me", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");

    let response = send(&app, bearer_request("GET", "/api/tasks", "not.a.jwt", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_concurrent_requests_keep_their_principal() {
    let app = create_router_for_testing();

    let mut sessions = Vec::new();
    for name in ["alice", "bobby", "carol", "dave1"] {
        let (access, _) = session(&app, name).await;
        sessions.push((name, access));
    }

    let requests = (0..8).flat_map(|_| sessions.iter()).map(|(name, access)| {
        let app = app.clone();
        let request = bearer_request("GET", "/api/users/me", access, None);
        async move {
            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            (name.to_string(), body_json(response).await)
        }
    });

    for (expected, principal) in futures::future::join_all(requests).await {
        assert_eq!(principal["username"], expected);
    }
}

#[tokio::test]
async fn test_delete_account() {
    let app = create_router_for_testing();
    let (access, refresh) = session(&app, "alice").await;

    let response = send(&app, bearer_request("DELETE", "/api/users/me", &access, None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, bearer_request("GET", "/api/users/me", &access, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, bearer_request("POST", "/auth/refreshtoken", &refresh, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The username is free again.
    assert_eq!(signup(&app, "alice", "secret").await.status(), StatusCode::CREATED);
}

// =============================================================================
// Task API Tests
// =============================================================================

#[tokio::test]
async fn test_task_crud() {
    let app = create_router_for_testing();
    let (access, _) = session(&app, "alice").await;

    let response = send(
        &app,
        bearer_request(
            "POST",
            "/api/tasks",
            &access,
            Some(json!({ "title": "Write release notes", "dueDate": "2026-11-02" })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let task = body_json(response).await;
    assert_eq!(task["status"], "PENDING");
    assert_eq!(task["dueDate"], "2026-11-02");
    let id = task["id"].as_str().unwrap().to_string();

    let response = send(
        &app,
        bearer_request(
            "PUT",
            &format!("/api/tasks/{id}"),
            &access,
            Some(json!({ "status": "IN_PROGRESS", "description": "Draft first, then review." })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["status"], "IN_PROGRESS");
    assert_eq!(updated["title"], "Write release notes");

    let response = send(&app, bearer_request("GET", &format!("/api/tasks/{id}"), &access, None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, bearer_request("DELETE", &format!("/api/tasks/{id}"), &access, None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, bearer_request("GET", &format!("/api/tasks/{id}"), &access, None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_task_validation() {
    let app = create_router_for_testing();
    let (access, _) = session(&app, "alice").await;

    for body in [
        json!({ "title": "" }),
        json!({ "title": "   " }),
        json!({ "title": "<b>bold</b>" }),
        json!({ "title": "ok", "description": "x".repeat(256) }),
    ] {
        let response = send(&app, bearer_request("POST", "/api/tasks", &access, Some(body))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_task_listing_filters_and_sorts() {
    let app = create_router_for_testing();
    let (access, _) = session(&app, "alice").await;

    for (title, due, status) in [
        ("Bravo", "2026-03-10", "PENDING"),
        ("Alpha", "2026-03-01", "COMPLETED"),
        ("Charlie", "2026-04-01", "PENDING"),
    ] {
        let response = send(
            &app,
            bearer_request(
                "POST",
                "/api/tasks",
                &access,
                Some(json!({ "title": title, "dueDate": due, "status": status })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = send(
        &app,
        bearer_request(
            "GET",
            "/api/tasks?status=PENDING&sortBy=title&sortDirection=desc",
            &access,
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let titles: Vec<String> = body_json(response)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["Charlie", "Bravo"]);

    let response = send(
        &app,
        bearer_request("GET", "/api/tasks?fromDate=2026-03-05&toDate=2026-03-31", &access, None),
    )
    .await;
    let tasks = body_json(response).await;
    assert_eq!(tasks.as_array().unwrap().len(), 1);
    assert_eq!(tasks[0]["title"], "Bravo");

    let response = send(
        &app,
        bearer_request("GET", "/api/tasks?fromDate=2026-04-01&toDate=2026-03-01", &access, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tasks_are_scoped_to_their_owner() {
    let app = create_router_for_testing();
    let (alice, _) = session(&app, "alice").await;
    let (bob, _) = session(&app, "bobby").await;

    let response = send(
        &app,
        bearer_request("POST", "/api/tasks", &alice, Some(json!({ "title": "Private" }))),
    )
    .await;
    let id = body_json(response).await["id"].as_str().unwrap().to_string();
    let uri = format!("/api/tasks/{id}");

    let response = send(&app, bearer_request("GET", &uri, &bob, None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &app,
        bearer_request("PUT", &uri, &bob, Some(json!({ "title": "Mine now" }))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, bearer_request("DELETE", &uri, &bob, None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, bearer_request("GET", "/api/tasks", &bob, None)).await;
    assert_eq!(body_json(response).await, json!([]));

    let response = send(&app, bearer_request("GET", &uri, &alice, None)).await;
    assert_eq!(body_json(response).await["title"], "Private");
}

// =============================================================================
// Store Outage Tests
// =============================================================================

/// Store whose every call fails as if the backend were down
struct OfflineStore;

fn offline<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl CredentialStore for OfflineStore {
    async fn insert_user(&self, _user: &User) -> StoreResult<()> {
        offline()
    }
    async fn find_by_username(&self, _username: &str) -> StoreResult<Option<User>> {
        offline()
    }
    async fn update_user(&self, _user: &User) -> StoreResult<bool> {
        offline()
    }
    async fn delete_user(&self, _username: &str) -> StoreResult<bool> {
        offline()
    }
    async fn list_users(&self) -> StoreResult<Vec<User>> {
        offline()
    }
}

#[async_trait]
impl RefreshTokenStore for OfflineStore {
    async fn save_refresh_token(&self, _token: &RefreshToken) -> StoreResult<()> {
        offline()
    }
    async fn find_by_token_hash(&self, _token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        offline()
    }
    async fn delete_by_token_hash(&self, _token_hash: &str) -> StoreResult<bool> {
        offline()
    }
    async fn delete_by_username(&self, _username: &str) -> StoreResult<u64> {
        offline()
    }
    async fn delete_expired(&self, _now: DateTime<Utc>) -> StoreResult<u64> {
        offline()
    }
}

#[async_trait]
impl TaskStore for OfflineStore {
    async fn insert_task(&self, _task: &Task) -> StoreResult<()> {
        offline()
    }
    async fn find_task(&self, _owner_id: Uuid, _id: Uuid) -> StoreResult<Option<Task>> {
        offline()
    }
    async fn list_tasks(&self, _owner_id: Uuid, _query: &TaskQuery) -> StoreResult<Vec<Task>> {
        offline()
    }
    async fn update_task(&self, _task: &Task) -> StoreResult<bool> {
        offline()
    }
    async fn delete_task(&self, _owner_id: Uuid, _id: Uuid) -> StoreResult<bool> {
        offline()
    }
    async fn delete_tasks_by_owner(&self, _owner_id: Uuid) -> StoreResult<u64> {
        offline()
    }
}

#[async_trait]
impl DocumentStore for OfflineStore {
    async fn ping(&self) -> StoreResult<()> {
        offline()
    }
    fn name(&self) -> &str {
        "offline"
    }
}

#[tokio::test]
async fn test_store_outage_is_503() {
    let app = create_router_with_store(Arc::new(OfflineStore));

    let response = signup(&app, "alice", "secret").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "SERVICE_UNAVAILABLE");

    let response = login(&app, "alice", "secret").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = send(
        &app,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Logout never fails, even when refresh tokens cannot be deleted.
    let response = send(&app, bearer_request("POST", "/auth/logout", "anything", None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

// =============================================================================
// OpenAPI Tests
// =============================================================================

#[tokio::test]
async fn test_openapi_spec_available() {
    let app = create_router_for_testing();

    let response = send(
        &app,
        Request::builder()
            .uri("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["paths"]["/auth/login"].is_object());
    assert!(json["paths"]["/api/tasks"].is_object());
}
