//! Store decorator applying the store call policy
//!
//! Reads and deletes are idempotent and get retried on transient failures.
//! Inserts, saves and updates get the timeout only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tasklane_core::{
    CredentialStore, DocumentStore, Idempotency, RefreshToken, RefreshTokenStore, RetryPolicy,
    StoreResult, Task, TaskQuery, TaskStore, User,
};
use uuid::Uuid;

use Idempotency::{Idempotent, NonIdempotent};

/// Wraps a backend so every call runs under a [`RetryPolicy`]
pub struct Guarded<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Guarded<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<S: CredentialStore> CredentialStore for Guarded<S> {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.policy
            .run("insert_user", NonIdempotent, || self.inner.insert_user(user))
            .await
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.policy
            .run("find_by_username", Idempotent, || {
                self.inner.find_by_username(username)
            })
            .await
    }

    async fn update_user(&self, user: &User) -> StoreResult<bool> {
        self.policy
            .run("update_user", NonIdempotent, || self.inner.update_user(user))
            .await
    }

    async fn delete_user(&self, username: &str) -> StoreResult<bool> {
        self.policy
            .run("delete_user", Idempotent, || self.inner.delete_user(username))
            .await
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        self.policy
            .run("list_users", Idempotent, || self.inner.list_users())
            .await
    }
}

#[async_trait]
impl<S: RefreshTokenStore> RefreshTokenStore for Guarded<S> {
    async fn save_refresh_token(&self, token: &RefreshToken) -> StoreResult<()> {
        self.policy
            .run("save_refresh_token", NonIdempotent, || {
                self.inner.save_refresh_token(token)
            })
            .await
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        self.policy
            .run("find_by_token_hash", Idempotent, || {
                self.inner.find_by_token_hash(token_hash)
            })
            .await
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> StoreResult<bool> {
        // Not retried: a lost reply would turn a won rotation into a loss.
        self.policy
            .run("delete_by_token_hash", NonIdempotent, || {
                self.inner.delete_by_token_hash(token_hash)
            })
            .await
    }

    async fn delete_by_username(&self, username: &str) -> StoreResult<u64> {
        self.policy
            .run("delete_by_username", Idempotent, || {
                self.inner.delete_by_username(username)
            })
            .await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.policy
            .run("delete_expired", Idempotent, || self.inner.delete_expired(now))
            .await
    }
}

#[async_trait]
impl<S: TaskStore> TaskStore for Guarded<S> {
    async fn insert_task(&self, task: &Task) -> StoreResult<()> {
        self.policy
            .run("insert_task", NonIdempotent, || self.inner.insert_task(task))
            .await
    }

    async fn find_task(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Option<Task>> {
        self.policy
            .run("find_task", Idempotent, || self.inner.find_task(owner_id, id))
            .await
    }

    async fn list_tasks(&self, owner_id: Uuid, query: &TaskQuery) -> StoreResult<Vec<Task>> {
        self.policy
            .run("list_tasks", Idempotent, || {
                self.inner.list_tasks(owner_id, query)
            })
            .await
    }

    async fn update_task(&self, task: &Task) -> StoreResult<bool> {
        self.policy
            .run("update_task", NonIdempotent, || self.inner.update_task(task))
            .await
    }

    async fn delete_task(&self, owner_id: Uuid, id: Uuid) -> StoreResult<bool> {
        self.policy
            .run("delete_task", Idempotent, || {
                self.inner.delete_task(owner_id, id)
            })
            .await
    }

    async fn delete_tasks_by_owner(&self, owner_id: Uuid) -> StoreResult<u64> {
        self.policy
            .run("delete_tasks_by_owner", Idempotent, || {
                self.inner.delete_tasks_by_owner(owner_id)
            })
            .await
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for Guarded<S> {
    async fn ping(&self) -> StoreResult<()> {
        self.policy
            .run("ping", NonIdempotent, || self.inner.ping())
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
