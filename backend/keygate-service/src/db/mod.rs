/// User datastore
///
/// The account flows only see [`UserRepository`]. Postgres backs it in
/// production; the in-memory implementation serves tests and local runs
/// without `DATABASE_URL`.
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewUser, User};

pub mod memory;
pub mod users;

pub use memory::MemoryUserRepository;
pub use users::PgUserRepository;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// A unique column already holds the value; carries the column name.
    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("database error: {0}")]
    Database(String),
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<User>>;

    /// `email` must already be normalized.
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>>;

    /// Match either column; email wins when both would match different users.
    async fn find_by_email_or_username(&self, value: &str) -> RepositoryResult<Option<User>>;

    async fn create_user(&self, new_user: NewUser) -> RepositoryResult<User>;

    /// Returns `false` when no such user exists.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> RepositoryResult<bool>;
}
