use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::{Enricher, FeedError, FeedView};
use crate::config::FeedConfig;
use crate::db::models::Like;
use crate::store::{DocumentStore, PostSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggle {
    pub liked: bool,
    pub like_count: u64,
}

/// Entry point for everything the feed screen does: render, like, delete.
#[derive(Clone)]
pub struct FeedAggregator {
    store: Arc<dyn DocumentStore>,
    enricher: Arc<Enricher>,
    /// Bumped on every like toggle. Live sessions re-run their pass on it.
    likes_tx: Arc<watch::Sender<u64>>,
}

impl FeedAggregator {
    pub fn new(store: Arc<dyn DocumentStore>, config: &FeedConfig) -> Self {
        let enricher = Enricher::new(
            store.clone(),
            config.lookup_timeout(),
            config.max_concurrency,
        );
        let (likes_tx, _) = watch::channel(0);
        Self {
            store,
            enricher: Arc::new(enricher),
            likes_tx: Arc::new(likes_tx),
        }
    }

    /// One enrichment pass over whatever the store holds right now.
    pub async fn render(&self, viewer_id: &str) -> FeedView {
        let snapshot = self.store.subscribe_posts().borrow().clone();
        self.enricher.enrich(&snapshot, viewer_id).await
    }

    /// Flip the viewer's like on a post and report the new state.
    pub async fn toggle_like(&self, post_id: &str, viewer_id: &str) -> Result<LikeToggle, FeedError> {
        if self.store.get_post(post_id).await?.is_none() {
            return Err(FeedError::NotFound(format!("post {}", post_id)));
        }

        let liked = if self.store.like_exists(post_id, viewer_id).await? {
            self.store.remove_like(post_id, viewer_id).await?;
            false
        } else {
            let like = Like {
                post_id: post_id.to_string(),
                user_id: viewer_id.to_string(),
                liked_at: Utc::now(),
            };
            self.store.put_like(&like).await?;
            true
        };

        let like_count = self.store.like_count(post_id).await?;
        tracing::debug!(post_id, viewer_id, liked, like_count, "like toggled");
        self.likes_tx.send_modify(|epoch| *epoch += 1);

        Ok(LikeToggle { liked, like_count })
    }

    /// Delete a post the viewer authored. The caller is expected to have
    /// confirmed the deletion with the user already.
    pub async fn delete_post(&self, post_id: &str, viewer_id: &str) -> Result<(), FeedError> {
        let post = self
            .store
            .get_post(post_id)
            .await?
            .ok_or_else(|| FeedError::NotFound(format!("post {}", post_id)))?;

        if post.author_id != viewer_id {
            tracing::warn!(post_id, viewer_id, "delete refused, viewer is not the author");
            return Err(FeedError::NotOwner);
        }

        if !self.store.delete_post(post_id).await? {
            // Gone between the lookup and the delete
            return Err(FeedError::NotFound(format!("post {}", post_id)));
        }

        tracing::info!(post_id, viewer_id, "post deleted");
        Ok(())
    }

    /// Start a live feed for one viewer.
    pub fn open_session(&self, viewer_id: impl Into<String>) -> FeedSession {
        let viewer_id = viewer_id.into();
        let (view_tx, view_rx) = watch::channel(None);
        let refresh = Arc::new(Notify::new());

        let task = tokio::spawn(run_session(
            self.enricher.clone(),
            self.store.subscribe_posts(),
            self.likes_tx.subscribe(),
            refresh.clone(),
            viewer_id.clone(),
            view_tx,
        ));

        FeedSession {
            viewer_id,
            aggregator: self.clone(),
            view_rx,
            refresh,
            task,
        }
    }
}

/// A viewer's live feed. Rebuilds the whole view on every posts snapshot
/// and after every like toggle, from any viewer. Dropping it stops the
/// background task.
pub struct FeedSession {
    viewer_id: String,
    aggregator: FeedAggregator,
    view_rx: watch::Receiver<Option<Arc<FeedView>>>,
    refresh: Arc<Notify>,
    task: JoinHandle<()>,
}

impl FeedSession {
    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    /// `None` until the first pass completes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<FeedView>>> {
        self.view_rx.clone()
    }

    pub fn current(&self) -> Option<Arc<FeedView>> {
        self.view_rx.borrow().clone()
    }

    /// Re-run enrichment over the latest snapshot.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// Like counts aren't part of the posts snapshot; the toggle signals
    /// every live session, this one included, to run a new pass.
    pub async fn toggle_like(&self, post_id: &str) -> Result<LikeToggle, FeedError> {
        self.aggregator.toggle_like(post_id, &self.viewer_id).await
    }

    /// The store republishes the posts snapshot, which drives the next pass.
    pub async fn delete_post(&self, post_id: &str) -> Result<(), FeedError> {
        self.aggregator.delete_post(post_id, &self.viewer_id).await
    }
}

impl Drop for FeedSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Sequential pass loop. A snapshot or refresh arriving mid-pass drops the
/// pass in flight and starts over on the newest snapshot, so an outdated
/// view is never published after a newer one. A like toggle mid-pass lets
/// the pass publish and then runs exactly one more.
async fn run_session(
    enricher: Arc<Enricher>,
    mut snapshots: watch::Receiver<PostSnapshot>,
    mut likes: watch::Receiver<u64>,
    refresh: Arc<Notify>,
    viewer_id: String,
    view_tx: watch::Sender<Option<Arc<FeedView>>>,
) {
    let mut next = Some(snapshots.borrow_and_update().clone());

    'session: loop {
        let snapshot = match next.take() {
            Some(snapshot) => snapshot,
            None => tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    snapshots.borrow_and_update().clone()
                }
                changed = likes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    likes.borrow_and_update();
                    snapshots.borrow_and_update().clone()
                }
                _ = refresh.notified() => snapshots.borrow_and_update().clone(),
            },
        };

        let pass = enricher.enrich(&snapshot, &viewer_id);
        tokio::pin!(pass);
        // Like changes never cancel a pass; they queue one more after it
        let mut likes_dirty = false;

        loop {
            tokio::select! {
                biased;

                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break 'session;
                    }
                    let newer = snapshots.borrow_and_update().clone();
                    tracing::debug!(stale = snapshot.seq, newer = newer.seq, "discarding in-flight feed pass");
                    next = Some(newer);
                    break;
                }
                changed = likes.changed() => {
                    if changed.is_err() {
                        break 'session;
                    }
                    likes.borrow_and_update();
                    likes_dirty = true;
                }
                _ = refresh.notified() => {
                    tracing::debug!(seq = snapshot.seq, "refresh requested mid-pass, restarting");
                    next = Some(snapshots.borrow_and_update().clone());
                    break;
                }
                view = &mut pass => {
                    tracing::debug!(seq = view.seq, rows = view.rows.len(), viewer_id = %viewer_id, "feed view published");
                    view_tx.send_replace(Some(Arc::new(view)));
                    if likes_dirty {
                        tracing::debug!(seq = snapshot.seq, "likes changed mid-pass, running again");
                        next = Some(snapshots.borrow_and_update().clone());
                    }
                    break;
                }
            }
        }
    }

    tracing::debug!(viewer_id = %viewer_id, "feed session ended");
}
