//! In-process document store
//!
//! Backs development servers and tests. Each collection sits behind its own
//! `RwLock`, so a single call is atomic but calls spanning collections are not.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tasklane_core::{
    CredentialStore, DocumentStore, RefreshToken, RefreshTokenStore, StoreError, StoreResult,
    Task, TaskQuery, TaskStore, User,
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Map-backed store
#[derive(Default)]
pub struct MemoryStore {
    /// Keyed by username
    users: RwLock<HashMap<String, User>>,
    /// Keyed by token digest
    refresh_tokens: RwLock<HashMap<String, RefreshToken>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.username) {
            return Err(StoreError::Duplicate {
                entity: "user",
                key: user.username.clone(),
            });
        }
        users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn update_user(&self, user: &User) -> StoreResult<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.username) {
            Some(existing) if existing.id == user.id => {
                *existing = user.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_user(&self, username: &str) -> StoreResult<bool> {
        Ok(self.users.write().await.remove(username).is_some())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn save_refresh_token(&self, token: &RefreshToken) -> StoreResult<()> {
        let mut tokens = self.refresh_tokens.write().await;
        if tokens.contains_key(&token.token_hash) {
            return Err(StoreError::Duplicate {
                entity: "refresh_token",
                key: token.id.to_string(),
            });
        }
        tokens.insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        Ok(self.refresh_tokens.read().await.get(token_hash).cloned())
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> StoreResult<bool> {
        Ok(self.refresh_tokens.write().await.remove(token_hash).is_some())
    }

    async fn delete_by_username(&self, username: &str) -> StoreResult<u64> {
        let mut tokens = self.refresh_tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.username != username);
        Ok((before - tokens.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tokens = self.refresh_tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert_task(&self, task: &Task) -> StoreResult<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::Duplicate {
                entity: "task",
                key: task.id.to_string(),
            });
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn find_task(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .get(&id)
            .filter(|t| t.owner_id == owner_id)
            .cloned())
    }

    async fn list_tasks(&self, owner_id: Uuid, query: &TaskQuery) -> StoreResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.owner_id == owner_id && query.matches(t))
            .cloned()
            .collect();
        query.sort(&mut tasks);
        Ok(tasks)
    }

    async fn update_task(&self, task: &Task) -> StoreResult<bool> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(existing) if existing.owner_id == task.owner_id => {
                *existing = task.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_task(&self, owner_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let mut tasks = self.tasks.write().await;
        if tasks.get(&id).is_some_and(|t| t.owner_id == owner_id) {
            tasks.remove(&id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete_tasks_by_owner(&self, owner_id: Uuid) -> StoreResult<u64> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, t| t.owner_id != owner_id);
        Ok((before - tasks.len()) as u64)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn token(username: &str, hash: &str, expires_at: DateTime<Utc>) -> RefreshToken {
        RefreshToken {
            id: Uuid::new_v4(),
            token_hash: hash.to_string(),
            username: username.to_string(),
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = MemoryStore::new();
        store.insert_user(&User::new("alice", "h1")).await.unwrap();

        let err = store.insert_user(&User::new("alice", "h2")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "user", .. }));

        // Usernames are case-sensitive.
        store.insert_user(&User::new("Alice", "h3")).await.unwrap();
        assert_eq!(store.list_users().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_requires_same_identity() {
        let store = MemoryStore::new();
        let mut alice = User::new("alice", "h1");
        store.insert_user(&alice).await.unwrap();

        alice.active = false;
        assert!(store.update_user(&alice).await.unwrap());
        assert!(!store.find_by_username("alice").await.unwrap().unwrap().active);

        // Same username, different account.
        let impostor = User::new("alice", "h2");
        assert!(!store.update_user(&impostor).await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_token_lifecycle() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .save_refresh_token(&token("alice", "a1", now + Duration::days(1)))
            .await
            .unwrap();
        store
            .save_refresh_token(&token("alice", "a2", now - Duration::seconds(1)))
            .await
            .unwrap();
        store
            .save_refresh_token(&token("bob", "b1", now + Duration::days(1)))
            .await
            .unwrap();

        assert!(store.find_by_token_hash("a1").await.unwrap().is_some());
        assert_eq!(store.delete_expired(now).await.unwrap(), 1);
        assert!(store.find_by_token_hash("a2").await.unwrap().is_none());

        assert_eq!(store.delete_by_username("alice").await.unwrap(), 1);
        assert_eq!(store.delete_by_username("alice").await.unwrap(), 0);
        assert!(store.find_by_token_hash("b1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_delete_has_one_winner() {
        let store = Arc::new(MemoryStore::new());
        store
            .save_refresh_token(&token("alice", "t", Utc::now() + Duration::days(1)))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.delete_by_token_hash("t").await.unwrap() })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_tasks_are_owner_scoped() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let task = Task::new(alice, "Pay rent");
        store.insert_task(&task).await.unwrap();
        store.insert_task(&Task::new(bob, "Walk dog")).await.unwrap();

        assert!(store.find_task(alice, task.id).await.unwrap().is_some());
        assert!(store.find_task(bob, task.id).await.unwrap().is_none());

        let mut hijack = task.clone();
        hijack.owner_id = bob;
        hijack.title = "Mine now".to_string();
        assert!(!store.update_task(&hijack).await.unwrap());
        assert!(!store.delete_task(bob, task.id).await.unwrap());

        let listed = store.list_tasks(alice, &TaskQuery::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Pay rent");

        assert_eq!(store.delete_tasks_by_owner(alice).await.unwrap(), 1);
        assert_eq!(store.list_tasks(bob, &TaskQuery::default()).await.unwrap().len(), 1);
    }
}
