pub mod memory;
pub mod post_repository;
pub mod user_repository;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::{Config, StorageBackend};
use crate::models::{LedgerState, NewSubmission, NewUser, Post, User};
use crate::utils::PaginationParams;

pub use memory::{MemoryPostRepository, MemoryUserRepository};
pub use post_repository::PgPostRepository;
pub use user_repository::PgUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("User '{0}' already exists")]
    Conflict(String),

    #[error("Invalid stored value: {0}")]
    Corrupt(String),
}

/// Result of a compare-and-swap on a user's ledger fields.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerUpdate {
    /// The write went through; carries the record as stored.
    Applied(User),
    /// Someone else wrote the ledger since it was read.
    Stale,
    Missing,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;

    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError>;

    /// Writes `ledger` only if the stored `ledger_version` still equals
    /// `expected_version`, bumping the version in the same step.
    async fn update_ledger(
        &self,
        username: &str,
        expected_version: i64,
        ledger: LedgerState,
    ) -> Result<LedgerUpdate, RepositoryError>;
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Newest posts first, each with its replies in acceptance order.
    async fn list_posts(&self, pagination: &PaginationParams) -> Result<Vec<Post>, RepositoryError>;

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>, RepositoryError>;

    async fn create_post(&self, post: NewSubmission) -> Result<Post, RepositoryError>;

    /// Returns `None` when the post does not exist.
    async fn add_reply(
        &self,
        post_id: Uuid,
        reply: NewSubmission,
    ) -> Result<Option<Post>, RepositoryError>;

    /// Adds `username` to the post's likers unless already present.
    /// Returns `None` when the post does not exist.
    async fn like_post(&self, post_id: Uuid, username: &str) -> Result<Option<Post>, RepositoryError>;

    /// Same as [`PostRepository::like_post`] for a reply. Returns `None` when
    /// either the post or the reply does not exist.
    async fn like_reply(
        &self,
        post_id: Uuid,
        reply_id: Uuid,
        username: &str,
    ) -> Result<Option<Post>, RepositoryError>;

    /// Deletes the post and its replies, returning the number of posts removed.
    async fn delete_post(&self, post_id: Uuid) -> Result<u64, RepositoryError>;
}

/// The storage handles the services are built from.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub posts: Arc<dyn PostRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(MemoryUserRepository::new()),
            posts: Arc::new(MemoryPostRepository::new()),
        }
    }

    /// Opens the configured backend, running migrations for Postgres.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        match config.storage {
            StorageBackend::Memory => {
                info!("Using in-memory storage; data is lost on restart");
                Ok(Self::in_memory())
            }
            StorageBackend::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_db_connections)
                    .connect(&config.database_url)
                    .await?;
                info!("Database connection pool established");

                sqlx::migrate!("./migrations").run(&pool).await?;
                info!("Database migrations completed");

                Ok(Self {
                    users: Arc::new(PgUserRepository::new(pool.clone())),
                    posts: Arc::new(PgPostRepository::new(pool)),
                })
            }
        }
    }
}
