use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::sync::Mutex;
use tokio::sync::watch;

use super::{DocumentStore, PostSnapshot, StoreError};
use crate::db::models::{from_micros, to_micros, Like, NewPost, Post, ProfileUpdate, UserProfile};
use crate::db::DbPool;

const POST_COLUMNS: &str = "id, user_id, image_url, description, location, created_at";

/// SQLite-backed store. Post mutations republish the whole ordered
/// collection on a watch channel, which is what live subscribers see.
pub struct SqliteDocumentStore {
    pool: DbPool,
    posts_tx: watch::Sender<PostSnapshot>,
    publish_lock: Mutex<()>,
}

impl SqliteDocumentStore {
    pub fn new(pool: DbPool) -> Result<Self, StoreError> {
        let initial = {
            let conn = pool.get()?;
            PostSnapshot::new(0, query_all_posts(&conn)?)
        };
        let (posts_tx, _) = watch::channel(initial);
        Ok(Self {
            pool,
            posts_tx,
            publish_lock: Mutex::new(()),
        })
    }

    /// Reload the collection and hand it to every subscriber.
    /// Serialized so a slower writer can never publish an older listing
    /// after a newer one.
    fn publish_posts(&self, conn: &rusqlite::Connection) -> Result<(), StoreError> {
        let _guard = self
            .publish_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("snapshot publisher poisoned".into()))?;
        let posts = query_all_posts(conn)?;
        self.posts_tx.send_modify(|snapshot| {
            let seq = snapshot.seq + 1;
            tracing::debug!(seq, count = posts.len(), "publishing posts snapshot");
            *snapshot = PostSnapshot::new(seq, posts);
        });
        Ok(())
    }

    /// Run `query` on a pooled connection on the blocking pool. Waiting for
    /// a connection or a lock happens off the async workers, so a caller's
    /// timeout can still fire.
    async fn blocking<T, F>(&self, query: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            query(&conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }
}

fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        author_id: row.get(1)?,
        image_url: row.get(2)?,
        description: row.get(3)?,
        location: row.get(4)?,
        created_at: from_micros(row.get(5)?),
    })
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        image: row.get(3)?,
        email: row.get(4)?,
    })
}

fn query_all_posts(conn: &rusqlite::Connection) -> Result<Vec<Post>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM posts ORDER BY created_at DESC, id DESC",
        POST_COLUMNS
    ))?;
    let posts = stmt
        .query_map([], row_to_post)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    fn subscribe_posts(&self) -> watch::Receiver<PostSnapshot> {
        self.posts_tx.subscribe()
    }

    async fn get_post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        let id = id.to_string();
        self.blocking(move |conn| {
            let post = conn
                .query_row(
                    &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
                    params![id],
                    row_to_post,
                )
                .optional()?;
            Ok(post)
        })
        .await
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, StoreError> {
        let post = Post {
            id: uuid::Uuid::now_v7().to_string(),
            author_id: post.author_id,
            image_url: post.image_url,
            description: post.description,
            location: post.location,
            created_at: Utc::now(),
        };

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO posts (id, user_id, image_url, description, location, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                post.id,
                post.author_id,
                post.image_url,
                post.description,
                post.location,
                to_micros(&post.created_at)
            ],
        )?;
        // Row is committed; the next mutation republishes it
        if let Err(e) = self.publish_posts(&conn) {
            tracing::error!(post_id = %post.id, error = %e, "post stored but snapshot not published");
        }

        Ok(post)
    }

    async fn delete_post(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        if rows > 0 {
            if let Err(e) = self.publish_posts(&conn) {
                tracing::error!(post_id = id, error = %e, "post deleted but snapshot not published");
            }
        }
        Ok(rows > 0)
    }

    async fn posts_by_author(&self, author_id: &str) -> Result<Vec<Post>, StoreError> {
        let author_id = author_id.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM posts WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
                POST_COLUMNS
            ))?;
            let posts = stmt
                .query_map(params![author_id], row_to_post)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(posts)
        })
        .await
    }

    async fn like_exists(&self, post_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let (post_id, user_id) = (post_id.to_string(), user_id.to_string());
        self.blocking(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT COUNT(*) > 0 FROM likes WHERE post_id = ?1 AND user_id = ?2",
                params![post_id, user_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn like_count(&self, post_id: &str) -> Result<u64, StoreError> {
        let post_id = post_id.to_string();
        self.blocking(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
                params![post_id],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn put_like(&self, like: &Like) -> Result<(), StoreError> {
        let like = like.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO likes (post_id, user_id, liked_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(post_id, user_id) DO NOTHING",
                params![like.post_id, like.user_id, to_micros(&like.liked_at)],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::NotFound(format!("post {}", like.post_id))
                }
                other => other.into(),
            })?;
            Ok(())
        })
        .await
    }

    async fn remove_like(&self, post_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let (post_id, user_id) = (post_id.to_string(), user_id.to_string());
        self.blocking(move |conn| {
            let rows = conn.execute(
                "DELETE FROM likes WHERE post_id = ?1 AND user_id = ?2",
                params![post_id, user_id],
            )?;
            Ok(rows > 0)
        })
        .await
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let user_id = user_id.to_string();
        self.blocking(move |conn| {
            let profile = conn
                .query_row(
                    "SELECT id, name, phone, image, email FROM profiles WHERE id = ?1",
                    params![user_id],
                    row_to_profile,
                )
                .optional()?;
            Ok(profile)
        })
        .await
    }

    async fn put_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO profiles (id, name, phone, image, email)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               phone = excluded.phone,
               image = excluded.image,
               email = excluded.email",
            params![
                profile.id,
                profile.name,
                profile.phone,
                profile.image,
                profile.email
            ],
        )?;
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE profiles SET
               name = COALESCE(?2, name),
               phone = COALESCE(?3, phone),
               image = COALESCE(?4, image)
             WHERE id = ?1",
            params![user_id, update.name, update.phone, update.image],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("profile {}", user_id)));
        }

        let profile = conn.query_row(
            "SELECT id, name, phone, image, email FROM profiles WHERE id = ?1",
            params![user_id],
            row_to_profile,
        )?;
        Ok(profile)
    }
}
