//! SurrealDB implementation of the document store
//!
//! Users, refresh tokens and tasks live in one namespace/database. Record ids
//! are the domain UUIDs; unique indexes on `users.username` and
//! `refresh_tokens.token_hash` turn races into duplicate errors.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use surrealdb::sql::{Datetime, Thing};
use surrealdb::Surreal;
use tasklane_core::{
    CredentialStore, DatabaseConfig, DocumentStore, RefreshToken, RefreshTokenStore,
    SortDirection, StoreError, StoreResult, Task, TaskQuery, TaskStatus, TaskStore, User,
};
use uuid::Uuid;

const USERS: &str = "users";
const REFRESH_TOKENS: &str = "refresh_tokens";
const TASKS: &str = "tasks";

/// SurrealDB store implementation
pub struct SurrealDbStore {
    client: Surreal<Client>,
}

impl SurrealDbStore {
    /// Create a new SurrealDB connection
    pub async fn new(config: &DatabaseConfig) -> StoreResult<Self> {
        // The ws engine adds the scheme itself.
        let url = config
            .surrealdb_url
            .strip_prefix("ws://")
            .or_else(|| config.surrealdb_url.strip_prefix("wss://"))
            .unwrap_or(&config.surrealdb_url);

        let client = Surreal::new::<Ws>(url)
            .await
            .map_err(|e| unavailable("SurrealDB connection failed", e))?;

        client
            .signin(Root {
                username: &config.surrealdb_user,
                password: &config.surrealdb_pass,
            })
            .await
            .map_err(|e| unavailable("SurrealDB auth failed", e))?;

        client
            .use_ns(&config.surrealdb_namespace)
            .use_db(&config.surrealdb_database)
            .await
            .map_err(|e| unavailable("SurrealDB namespace error", e))?;

        Ok(Self { client })
    }

    /// Initialize tables and indexes (idempotent)
    pub async fn init_schema(&self) -> StoreResult<()> {
        self.client
            .query(
                r#"
                DEFINE TABLE IF NOT EXISTS users SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_users_username ON users FIELDS username UNIQUE;

                DEFINE TABLE IF NOT EXISTS refresh_tokens SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_refresh_token_hash ON refresh_tokens FIELDS token_hash UNIQUE;
                DEFINE INDEX IF NOT EXISTS idx_refresh_username ON refresh_tokens FIELDS username;

                DEFINE TABLE IF NOT EXISTS tasks SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_tasks_owner ON tasks FIELDS owner_id;
            "#,
            )
            .await
            .map_err(|e| unavailable("Schema init failed", e))?
            .check()
            .map_err(|e| unavailable("Schema init failed", e))?;

        Ok(())
    }
}

fn unavailable(context: &str, e: surrealdb::Error) -> StoreError {
    StoreError::Unavailable(format!("{context}: {e}"))
}

/// Map a write error, recognising unique index violations
fn write_error(entity: &'static str, key: &str, e: surrealdb::Error) -> StoreError {
    let message = e.to_string();
    if message.contains("already contains") || message.contains("already exists") {
        StoreError::Duplicate {
            entity,
            key: key.to_string(),
        }
    } else {
        StoreError::Unavailable(format!("Failed to write {entity}: {message}"))
    }
}

fn record_uuid(id: &Option<Thing>) -> StoreResult<Uuid> {
    let thing = id
        .as_ref()
        .ok_or_else(|| StoreError::Serialization("record without id".to_string()))?;
    Uuid::parse_str(&thing.id.to_raw())
        .map_err(|e| StoreError::Serialization(format!("bad record id {thing}: {e}")))
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    #[serde(skip_serializing)]
    id: Option<Thing>,
    username: String,
    password_hash: String,
    roles: Vec<String>,
    active: bool,
    created_at: Datetime,
    updated_at: Datetime,
}

impl From<&User> for UserRecord {
    fn from(user: &User) -> Self {
        Self {
            id: None,
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            roles: user.roles.clone(),
            active: user.active,
            created_at: user.created_at.into(),
            updated_at: user.updated_at.into(),
        }
    }
}

impl TryFrom<UserRecord> for User {
    type Error = StoreError;

    fn try_from(r: UserRecord) -> StoreResult<Self> {
        Ok(User {
            id: record_uuid(&r.id)?,
            username: r.username,
            password_hash: r.password_hash,
            roles: r.roles,
            active: r.active,
            created_at: r.created_at.0,
            updated_at: r.updated_at.0,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RefreshTokenRecord {
    #[serde(skip_serializing)]
    id: Option<Thing>,
    token_hash: String,
    username: String,
    expires_at: Datetime,
    created_at: Datetime,
}

impl From<&RefreshToken> for RefreshTokenRecord {
    fn from(token: &RefreshToken) -> Self {
        Self {
            id: None,
            token_hash: token.token_hash.clone(),
            username: token.username.clone(),
            expires_at: token.expires_at.into(),
            created_at: token.created_at.into(),
        }
    }
}

impl TryFrom<RefreshTokenRecord> for RefreshToken {
    type Error = StoreError;

    fn try_from(r: RefreshTokenRecord) -> StoreResult<Self> {
        Ok(RefreshToken {
            id: record_uuid(&r.id)?,
            token_hash: r.token_hash,
            username: r.username,
            expires_at: r.expires_at.0,
            created_at: r.created_at.0,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaskRecord {
    #[serde(skip_serializing)]
    id: Option<Thing>,
    owner_id: String,
    title: String,
    description: Option<String>,
    /// ISO date; orders lexicographically
    due_date: String,
    status: TaskStatus,
    created_at: Datetime,
    updated_at: Datetime,
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        Self {
            id: None,
            owner_id: task.owner_id.to_string(),
            title: task.title.clone(),
            description: task.description.clone(),
            due_date: task.due_date.to_string(),
            status: task.status,
            created_at: task.created_at.into(),
            updated_at: task.updated_at.into(),
        }
    }
}

impl TryFrom<TaskRecord> for Task {
    type Error = StoreError;

    fn try_from(r: TaskRecord) -> StoreResult<Self> {
        Ok(Task {
            id: record_uuid(&r.id)?,
            owner_id: Uuid::parse_str(&r.owner_id)
                .map_err(|e| StoreError::Serialization(format!("bad owner id: {e}")))?,
            title: r.title,
            description: r.description,
            due_date: NaiveDate::parse_from_str(&r.due_date, "%Y-%m-%d")
                .map_err(|e| StoreError::Serialization(format!("bad due date: {e}")))?,
            status: r.status,
            created_at: r.created_at.0,
            updated_at: r.updated_at.0,
        })
    }
}

fn convert_all<R, T>(records: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    records.into_iter().map(T::try_from).collect()
}

// ============================================================================
// Store implementations
// ============================================================================

#[async_trait]
impl CredentialStore for SurrealDbStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let _: Option<UserRecord> = self
            .client
            .create((USERS, user.id.to_string()))
            .content(UserRecord::from(user))
            .await
            .map_err(|e| write_error("user", &user.username, e))?;

        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let records: Vec<UserRecord> = self
            .client
            .query("SELECT * FROM users WHERE username = $username LIMIT 1")
            .bind(("username", username.to_string()))
            .await
            .map_err(|e| unavailable("User lookup failed", e))?
            .take(0)
            .map_err(|e| unavailable("Result extraction failed", e))?;

        records.into_iter().next().map(User::try_from).transpose()
    }

    async fn update_user(&self, user: &User) -> StoreResult<bool> {
        let updated: Option<UserRecord> = self
            .client
            .update((USERS, user.id.to_string()))
            .content(UserRecord::from(user))
            .await
            .map_err(|e| write_error("user", &user.username, e))?;

        Ok(updated.is_some())
    }

    async fn delete_user(&self, username: &str) -> StoreResult<bool> {
        let removed: Vec<UserRecord> = self
            .client
            .query("DELETE users WHERE username = $username RETURN BEFORE")
            .bind(("username", username.to_string()))
            .await
            .map_err(|e| unavailable("User delete failed", e))?
            .take(0)
            .map_err(|e| unavailable("Result extraction failed", e))?;

        Ok(!removed.is_empty())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let records: Vec<UserRecord> = self
            .client
            .query("SELECT * FROM users ORDER BY username")
            .await
            .map_err(|e| unavailable("User listing failed", e))?
            .take(0)
            .map_err(|e| unavailable("Result extraction failed", e))?;

        convert_all(records)
    }
}

#[async_trait]
impl RefreshTokenStore for SurrealDbStore {
    async fn save_refresh_token(&self, token: &RefreshToken) -> StoreResult<()> {
        let _: Option<RefreshTokenRecord> = self
            .client
            .create((REFRESH_TOKENS, token.id.to_string()))
            .content(RefreshTokenRecord::from(token))
            .await
            .map_err(|e| write_error("refresh_token", &token.id.to_string(), e))?;

        Ok(())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        let records: Vec<RefreshTokenRecord> = self
            .client
            .query("SELECT * FROM refresh_tokens WHERE token_hash = $hash LIMIT 1")
            .bind(("hash", token_hash.to_string()))
            .await
            .map_err(|e| unavailable("Refresh token lookup failed", e))?
            .take(0)
            .map_err(|e| unavailable("Result extraction failed", e))?;

        records
            .into_iter()
            .next()
            .map(RefreshToken::try_from)
            .transpose()
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> StoreResult<bool> {
        let removed: Vec<RefreshTokenRecord> = self
            .client
            .query("DELETE refresh_tokens WHERE token_hash = $hash RETURN BEFORE")
            .bind(("hash", token_hash.to_string()))
            .await
            .map_err(|e| unavailable("Refresh token delete failed", e))?
            .take(0)
            .map_err(|e| unavailable("Result extraction failed", e))?;

        Ok(!removed.is_empty())
    }

    async fn delete_by_username(&self, username: &str) -> StoreResult<u64> {
        let removed: Vec<RefreshTokenRecord> = self
            .client
            .query("DELETE refresh_tokens WHERE username = $username RETURN BEFORE")
            .bind(("username", username.to_string()))
            .await
            .map_err(|e| unavailable("Refresh token delete failed", e))?
            .take(0)
            .map_err(|e| unavailable("Result extraction failed", e))?;

        Ok(removed.len() as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let removed: Vec<RefreshTokenRecord> = self
            .client
            .query("DELETE refresh_tokens WHERE expires_at <= $now RETURN BEFORE")
            .bind(("now", Datetime::from(now)))
            .await
            .map_err(|e| unavailable("Refresh token sweep failed", e))?
            .take(0)
            .map_err(|e| unavailable("Result extraction failed", e))?;

        Ok(removed.len() as u64)
    }
}

/// Build the listing statement; the sort column comes from a closed enum
fn list_tasks_sql(query: &TaskQuery) -> String {
    let mut sql = String::from("SELECT * FROM tasks WHERE owner_id = $owner");
    if query.status.is_some() {
        sql.push_str(" AND status = $status");
    }
    if query.from_date.is_some() {
        sql.push_str(" AND due_date >= $from");
    }
    if query.to_date.is_some() {
        sql.push_str(" AND due_date <= $to");
    }
    let direction = match query.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    sql.push_str(&format!(
        " ORDER BY {} {direction}, created_at {direction}",
        query.sort_by.column()
    ));
    sql
}

#[async_trait]
impl TaskStore for SurrealDbStore {
    async fn insert_task(&self, task: &Task) -> StoreResult<()> {
        let _: Option<TaskRecord> = self
            .client
            .create((TASKS, task.id.to_string()))
            .content(TaskRecord::from(task))
            .await
            .map_err(|e| write_error("task", &task.id.to_string(), e))?;

        Ok(())
    }

    async fn find_task(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Option<Task>> {
        let record: Option<TaskRecord> = self
            .client
            .select((TASKS, id.to_string()))
            .await
            .map_err(|e| unavailable("Task lookup failed", e))?;

        record
            .filter(|r| r.owner_id == owner_id.to_string())
            .map(Task::try_from)
            .transpose()
    }

    async fn list_tasks(&self, owner_id: Uuid, query: &TaskQuery) -> StoreResult<Vec<Task>> {
        let mut request = self
            .client
            .query(list_tasks_sql(query))
            .bind(("owner", owner_id.to_string()));
        if let Some(status) = query.status {
            request = request.bind(("status", status.as_str()));
        }
        if let Some(from) = query.from_date {
            request = request.bind(("from", from.to_string()));
        }
        if let Some(to) = query.to_date {
            request = request.bind(("to", to.to_string()));
        }

        let records: Vec<TaskRecord> = request
            .await
            .map_err(|e| unavailable("Task listing failed", e))?
            .take(0)
            .map_err(|e| unavailable("Result extraction failed", e))?;

        convert_all(records)
    }

    async fn update_task(&self, task: &Task) -> StoreResult<bool> {
        let updated: Vec<TaskRecord> = self
            .client
            .query("UPDATE type::thing('tasks', $id) CONTENT $content WHERE owner_id = $owner")
            .bind(("id", task.id.to_string()))
            .bind(("content", TaskRecord::from(task)))
            .bind(("owner", task.owner_id.to_string()))
            .await
            .map_err(|e| unavailable("Task update failed", e))?
            .take(0)
            .map_err(|e| unavailable("Result extraction failed", e))?;

        Ok(!updated.is_empty())
    }

    async fn delete_task(&self, owner_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let removed: Vec<TaskRecord> = self
            .client
            .query("DELETE type::thing('tasks', $id) WHERE owner_id = $owner RETURN BEFORE")
            .bind(("id", id.to_string()))
            .bind(("owner", owner_id.to_string()))
            .await
            .map_err(|e| unavailable("Task delete failed", e))?
            .take(0)
            .map_err(|e| unavailable("Result extraction failed", e))?;

        Ok(!removed.is_empty())
    }

    async fn delete_tasks_by_owner(&self, owner_id: Uuid) -> StoreResult<u64> {
        let removed: Vec<TaskRecord> = self
            .client
            .query("DELETE tasks WHERE owner_id = $owner RETURN BEFORE")
            .bind(("owner", owner_id.to_string()))
            .await
            .map_err(|e| unavailable("Task delete failed", e))?
            .take(0)
            .map_err(|e| unavailable("Result extraction failed", e))?;

        Ok(removed.len() as u64)
    }
}

#[async_trait]
impl DocumentStore for SurrealDbStore {
    async fn ping(&self) -> StoreResult<()> {
        self.client
            .health()
            .await
            .map_err(|e| unavailable("SurrealDB health check failed", e))
    }

    fn name(&self) -> &str {
        "surrealdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tasklane_core::TaskSortField;

    #[test]
    fn test_list_sql_only_binds_present_filters() {
        let sql = list_tasks_sql(&TaskQuery::default());
        assert_eq!(
            sql,
            "SELECT * FROM tasks WHERE owner_id = $owner ORDER BY due_date ASC, created_at ASC"
        );

        let sql = list_tasks_sql(&TaskQuery {
            status: Some(TaskStatus::Pending),
            from_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            sort_by: TaskSortField::Title,
            direction: SortDirection::Desc,
            ..Default::default()
        });
        assert!(sql.contains("AND status = $status"));
        assert!(sql.contains("AND due_date >= $from"));
        assert!(!sql.contains("$to"));
        assert!(sql.ends_with("ORDER BY title DESC, created_at DESC"));
    }

    #[test]
    fn test_task_record_conversion() {
        let task = Task::new(Uuid::new_v4(), "Pay rent").with_description("before the 5th");
        let mut record = TaskRecord::from(&task);
        assert_eq!(record.due_date, task.due_date.format("%Y-%m-%d").to_string());

        assert!(Task::try_from(record.clone()).is_err());

        record.id = Some(Thing::from((TASKS, task.id.to_string().as_str())));
        let restored = Task::try_from(record).unwrap();
        assert_eq!(restored.id, task.id);
        assert_eq!(restored.owner_id, task.owner_id);
        assert_eq!(restored.description, task.description);
    }
}
