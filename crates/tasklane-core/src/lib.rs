//! Tasklane Core - Domain models, store traits, and shared policies
//!
//! This crate defines the abstractions shared by the server and the CLI:
//! - User, refresh token and task models
//! - Store traits for credentials, refresh tokens and tasks
//! - Store error taxonomy
//! - Timeout and retry policy for store calls
//! - Argon2id password hashing
//! - Configuration management
//!
//! Author: hephaex@gmail.com

pub mod config;
pub mod password;
pub mod retry;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, PasswordConfig, RateLimitConfig,
    RevocationConfig, StoreBackend, StoreConfig,
};
pub use retry::{Idempotency, RetryPolicy};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Role granted to every user whose role set is empty
pub const DEFAULT_ROLE: &str = "ROLE_USER";

// ============================================================================
// Error Types
// ============================================================================

/// Failures surfaced by document store backends
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Users
// ============================================================================

/// Persisted account
///
/// `password_hash` is an Argon2id PHC string. It is redacted from `Debug`
/// output and must never leave the service in a response body.
#[derive(Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    /// Unique, case-sensitive
    pub username: String,
    pub password_hash: String,
    /// Empty means [`DEFAULT_ROLE`]
    pub roles: Vec<String>,
    /// Inactive users fail every authentication path
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// New active user without explicit roles
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            password_hash: password_hash.into(),
            roles: Vec::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Roles as seen by authorization checks
    pub fn effective_roles(&self) -> Vec<String> {
        if self.roles.is_empty() {
            vec![DEFAULT_ROLE.to_string()]
        } else {
            self.roles.clone()
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.effective_roles().iter().any(|r| r == role)
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("roles", &self.roles)
            .field("active", &self.active)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

// ============================================================================
// Refresh Tokens
// ============================================================================

/// Persisted refresh token
///
/// Only the SHA-256 digest of the opaque token is stored; the plaintext is
/// handed to the client once and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    /// Hex-encoded SHA-256 of the token
    pub token_hash: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    /// A token is expired from its expiry instant onward
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Task lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A user's task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Id of the owning user; every task operation is scoped by it
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// New pending task; the due date defaults to today
    pub fn new(owner_id: Uuid, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title: title.into(),
            description: None,
            due_date: now.date_naive(),
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = due_date;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Apply a partial update, bumping `updated_at` when anything changed
    pub fn apply(&mut self, update: TaskUpdate) -> bool {
        let mut changed = false;
        if let Some(title) = update.title {
            changed |= self.title != title;
            self.title = title;
        }
        if let Some(description) = update.description {
            changed |= self.description.as_deref() != Some(description.as_str());
            self.description = Some(description);
        }
        if let Some(due_date) = update.due_date {
            changed |= self.due_date != due_date;
            self.due_date = due_date;
        }
        if let Some(status) = update.status {
            changed |= self.status != status;
            self.status = status;
        }
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }
}

/// Partial task update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<TaskStatus>,
}

/// Field a task listing is ordered by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum TaskSortField {
    #[default]
    DueDate,
    Title,
    Status,
    CreatedAt,
}

impl TaskSortField {
    /// Column name used by document store queries
    pub fn column(&self) -> &'static str {
        match self {
            Self::DueDate => "due_date",
            Self::Title => "title",
            Self::Status => "status",
            Self::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Filter and ordering for task listings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    /// Inclusive lower bound on the due date
    pub from_date: Option<NaiveDate>,
    /// Inclusive upper bound on the due date
    pub to_date: Option<NaiveDate>,
    pub sort_by: TaskSortField,
    pub direction: SortDirection,
}

impl TaskQuery {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self.from_date.map_or(true, |d| task.due_date >= d)
            && self.to_date.map_or(true, |d| task.due_date <= d)
    }

    /// Order tasks in place; ties fall back to creation time
    pub fn sort(&self, tasks: &mut [Task]) {
        tasks.sort_by(|a, b| {
            let ord = match self.sort_by {
                TaskSortField::DueDate => a.due_date.cmp(&b.due_date),
                TaskSortField::Title => a.title.cmp(&b.title),
                TaskSortField::Status => a.status.as_str().cmp(b.status.as_str()),
                TaskSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            }
            .then_with(|| a.created_at.cmp(&b.created_at));
            match self.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Persisted user accounts
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new user; a taken username yields [`StoreError::Duplicate`]
    async fn insert_user(&self, user: &User) -> StoreResult<()>;

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Replace an existing user; `false` if it no longer exists
    async fn update_user(&self, user: &User) -> StoreResult<bool>;

    async fn delete_user(&self, username: &str) -> StoreResult<bool>;

    async fn list_users(&self) -> StoreResult<Vec<User>>;
}

/// Persisted refresh tokens, addressed by token digest
#[async_trait::async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn save_refresh_token(&self, token: &RefreshToken) -> StoreResult<()>;

    async fn find_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>>;

    /// Delete one token; `true` only for the caller that actually removed it
    async fn delete_by_token_hash(&self, token_hash: &str) -> StoreResult<bool>;

    /// Delete every token bound to a user, returning how many were removed
    async fn delete_by_username(&self, username: &str) -> StoreResult<u64>;

    /// Housekeeping: drop tokens expired at `now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Persisted tasks; every call is scoped by owner
#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert_task(&self, task: &Task) -> StoreResult<()>;

    async fn find_task(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Option<Task>>;

    async fn list_tasks(&self, owner_id: Uuid, query: &TaskQuery) -> StoreResult<Vec<Task>>;

    /// Replace a task owned by `task.owner_id`; `false` if none matched
    async fn update_task(&self, task: &Task) -> StoreResult<bool>;

    async fn delete_task(&self, owner_id: Uuid, id: Uuid) -> StoreResult<bool>;

    async fn delete_tasks_by_owner(&self, owner_id: Uuid) -> StoreResult<u64>;
}

/// A backend holding every collection the service uses
#[async_trait::async_trait]
pub trait DocumentStore: CredentialStore + RefreshTokenStore + TaskStore {
    /// Cheap liveness probe used by readiness checks
    async fn ping(&self) -> StoreResult<()>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================
