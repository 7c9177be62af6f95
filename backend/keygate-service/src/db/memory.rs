use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{RepositoryError, RepositoryResult, UserRepository};
use crate::models::{NewUser, User};

/// Process-local user table. Uniqueness of email and username is enforced
/// under the write lock, like the Postgres constraints.
#[derive(Clone, Default)]
pub struct MemoryUserRepository {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.users.read().len()
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users.read().values().find(|u| pred(u)).cloned()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        Ok(self.find(|u| u.email == email))
    }

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        Ok(self.find(|u| u.username == username))
    }

    async fn find_by_email_or_username(&self, value: &str) -> RepositoryResult<Option<User>> {
        let value = value.trim();
        let email = value.to_lowercase();
        Ok(self
            .find(|u| u.email == email)
            .or_else(|| self.find(|u| u.username == value)))
    }

    async fn create_user(&self, new_user: NewUser) -> RepositoryResult<User> {
        let mut users = self.users.write();
        if users.values().any(|u| u.email == new_user.email) {
            return Err(RepositoryError::Conflict("Email"));
        }
        if users.values().any(|u| u.username == new_user.username) {
            return Err(RepositoryError::Conflict("Username"));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> RepositoryResult<bool> {
        match self.users.write().get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
