use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{FeedAuthor, FeedRow, FeedView};
use crate::db::models::Post;
use crate::store::{DocumentStore, PostSnapshot, StoreError};

#[derive(Debug, Clone, Copy, Default)]
struct LikeState {
    liked: bool,
    count: u64,
}

/// Runs one enrichment pass over a posts snapshot.
///
/// Like lookups fan out with bounded parallelism and come back in snapshot
/// order; profiles are fetched once per distinct author. Every lookup has a
/// timeout, and a failed lookup degrades its own row instead of the pass.
pub struct Enricher {
    store: Arc<dyn DocumentStore>,
    lookup_timeout: Duration,
    max_concurrency: usize,
}

impl Enricher {
    pub fn new(store: Arc<dyn DocumentStore>, lookup_timeout: Duration, max_concurrency: usize) -> Self {
        Self {
            store,
            lookup_timeout,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn enrich(&self, snapshot: &PostSnapshot, viewer_id: &str) -> FeedView {
        let posts = snapshot.posts.as_slice();

        let (authors, likes) = futures::join!(
            self.resolve_authors(posts),
            self.resolve_likes(posts, viewer_id)
        );

        let rows = posts
            .iter()
            .zip(likes)
            .map(|(post, like)| FeedRow {
                author: authors
                    .get(&post.author_id)
                    .cloned()
                    .unwrap_or_else(|| FeedAuthor::placeholder(&post.author_id)),
                liked: like.liked,
                like_count: like.count,
                is_owner: post.author_id == viewer_id,
                post: post.clone(),
            })
            .collect();

        FeedView {
            seq: snapshot.seq,
            rows,
        }
    }

    async fn resolve_likes(&self, posts: &[Post], viewer_id: &str) -> Vec<LikeState> {
        let lookups: Vec<_> = posts
            .iter()
            .map(|post| self.like_state(post, viewer_id))
            .collect();
        // buffered, not buffer_unordered: output order is snapshot order
        stream::iter(lookups)
            .buffered(self.max_concurrency)
            .collect()
            .await
    }

    async fn like_state(&self, post: &Post, viewer_id: &str) -> LikeState {
        let (liked, count) = tokio::join!(
            self.bounded(
                "like_status",
                &post.id,
                self.store.like_exists(&post.id, viewer_id)
            ),
            self.bounded("like_count", &post.id, self.store.like_count(&post.id)),
        );
        LikeState {
            liked: liked.unwrap_or(false),
            count: count.unwrap_or(0),
        }
    }

    async fn resolve_authors(&self, posts: &[Post]) -> HashMap<String, FeedAuthor> {
        let mut seen = HashSet::new();
        let author_ids: Vec<&str> = posts
            .iter()
            .map(|post| post.author_id.as_str())
            .filter(|id| seen.insert(*id))
            .collect();

        let lookups: Vec<_> = author_ids
            .into_iter()
            .map(|id| self.resolve_author(id))
            .collect();
        stream::iter(lookups)
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await
    }

    async fn resolve_author(&self, id: &str) -> (String, FeedAuthor) {
        let author = match self.bounded("profile", id, self.store.get_profile(id)).await {
            Some(Some(profile)) => FeedAuthor::from_profile(profile),
            Some(None) => {
                tracing::debug!(author_id = id, "author has no profile");
                FeedAuthor::placeholder(id)
            }
            None => FeedAuthor::placeholder(id),
        };
        (id.to_string(), author)
    }

    async fn bounded<T>(
        &self,
        lookup: &'static str,
        key: &str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.lookup_timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::warn!(lookup, key, error = %e, "feed lookup failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    lookup,
                    key,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "feed lookup timed out"
                );
                None
            }
        }
    }
}
