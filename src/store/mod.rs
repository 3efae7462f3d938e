//! Document store seam.
//!
//! Posts, likes and profiles live behind [`DocumentStore`]. The feed and the
//! HTTP layer only ever see this trait; [`SqliteDocumentStore`] is the
//! implementation wired up in `main`.

mod sqlite;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use crate::db::models::{Like, NewPost, Post, ProfileUpdate, UserProfile};

pub use sqlite::SqliteDocumentStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Full listing of the posts collection, newest first.
///
/// Every delivery supersedes the previous one; `seq` grows with each
/// publication so consumers can tell deliveries apart.
#[derive(Debug, Clone, Default)]
pub struct PostSnapshot {
    pub seq: u64,
    pub posts: Arc<Vec<Post>>,
}

impl PostSnapshot {
    pub fn new(seq: u64, posts: Vec<Post>) -> Self {
        Self {
            seq,
            posts: Arc::new(posts),
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Standing subscription to the posts collection ordered by creation
    /// time descending. The receiver always holds the latest snapshot.
    fn subscribe_posts(&self) -> watch::Receiver<PostSnapshot>;

    async fn get_post(&self, id: &str) -> Result<Option<Post>, StoreError>;

    async fn create_post(&self, post: NewPost) -> Result<Post, StoreError>;

    /// Returns false if the post did not exist.
    async fn delete_post(&self, id: &str) -> Result<bool, StoreError>;

    /// Posts whose author equals `author_id`, newest first.
    async fn posts_by_author(&self, author_id: &str) -> Result<Vec<Post>, StoreError>;

    async fn like_exists(&self, post_id: &str, user_id: &str) -> Result<bool, StoreError>;

    async fn like_count(&self, post_id: &str) -> Result<u64, StoreError>;

    async fn put_like(&self, like: &Like) -> Result<(), StoreError>;

    /// Returns false if there was no like to remove.
    async fn remove_like(&self, post_id: &str, user_id: &str) -> Result<bool, StoreError>;

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    async fn put_profile(&self, profile: &UserProfile) -> Result<(), StoreError>;

    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, StoreError>;
}
