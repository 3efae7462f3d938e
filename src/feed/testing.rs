//! In-memory store double for feed tests: counts profile fetches and can
//! slow down, hang or fail individual lookups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use crate::db::models::{Like, NewPost, Post, ProfileUpdate, UserProfile};
use crate::store::{DocumentStore, PostSnapshot, StoreError};

pub fn post(id: &str, author: &str, created_secs: i64) -> Post {
    Post {
        id: id.to_string(),
        author_id: author.to_string(),
        image_url: format!("http://host/uploads/{}.jpg", id),
        description: format!("post {}", id),
        location: "Rua A, Curitiba".to_string(),
        created_at: DateTime::from_timestamp(created_secs, 0).unwrap_or_default(),
    }
}

pub struct FakeStore {
    posts_tx: watch::Sender<PostSnapshot>,
    posts: Mutex<Vec<Post>>,
    likes: Mutex<HashSet<(String, String)>>,
    profiles: Mutex<HashMap<String, UserProfile>>,
    failing_profiles: Mutex<HashSet<String>>,
    hung_profiles: Mutex<HashSet<String>>,
    slow_likes: Mutex<HashMap<String, Duration>>,
    pub profile_fetches: AtomicUsize,
    pub post_deletes: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        let (posts_tx, _) = watch::channel(PostSnapshot::default());
        Arc::new(Self {
            posts_tx,
            posts: Mutex::new(Vec::new()),
            likes: Mutex::new(HashSet::new()),
            profiles: Mutex::new(HashMap::new()),
            failing_profiles: Mutex::new(HashSet::new()),
            hung_profiles: Mutex::new(HashSet::new()),
            slow_likes: Mutex::new(HashMap::new()),
            profile_fetches: AtomicUsize::new(0),
            post_deletes: AtomicUsize::new(0),
        })
    }

    /// Replace the collection and deliver it newest first.
    pub fn publish(&self, posts: Vec<Post>) {
        *self.posts.lock().unwrap() = posts;
        self.republish();
    }

    pub fn snapshot(&self) -> PostSnapshot {
        self.posts_tx.borrow().clone()
    }

    pub fn add_profile(&self, id: &str, name: &str) {
        let profile = UserProfile {
            name: name.to_string(),
            ..UserProfile::empty(id, format!("{}@treinos.app", id))
        };
        self.profiles.lock().unwrap().insert(id.to_string(), profile);
    }

    pub fn fail_profile(&self, id: &str) {
        self.failing_profiles.lock().unwrap().insert(id.to_string());
    }

    pub fn hang_profile(&self, id: &str) {
        self.hung_profiles.lock().unwrap().insert(id.to_string());
    }

    pub fn slow_likes(&self, post_id: &str, delay: Duration) {
        self.slow_likes
            .lock()
            .unwrap()
            .insert(post_id.to_string(), delay);
    }

    pub fn add_like(&self, post_id: &str, user_id: &str) {
        self.likes
            .lock()
            .unwrap()
            .insert((post_id.to_string(), user_id.to_string()));
    }

    pub fn like_records(&self) -> usize {
        self.likes.lock().unwrap().len()
    }

    fn republish(&self) {
        let mut posts = self.posts.lock().unwrap().clone();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        self.posts_tx
            .send_modify(|snapshot| *snapshot = PostSnapshot::new(snapshot.seq + 1, posts));
    }

    async fn like_delay(&self, post_id: &str) {
        let delay = self.slow_likes.lock().unwrap().get(post_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    fn subscribe_posts(&self) -> watch::Receiver<PostSnapshot> {
        self.posts_tx.subscribe()
    }

    async fn get_post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        Ok(self.posts.lock().unwrap().iter().find(|p| p.id == id).cloned())
    }

    async fn create_post(&self, new: NewPost) -> Result<Post, StoreError> {
        let post = Post {
            id: uuid::Uuid::now_v7().to_string(),
            author_id: new.author_id,
            image_url: new.image_url,
            description: new.description,
            location: new.location,
            created_at: Utc::now(),
        };
        self.posts.lock().unwrap().push(post.clone());
        self.republish();
        Ok(post)
    }

    async fn delete_post(&self, id: &str) -> Result<bool, StoreError> {
        self.post_deletes.fetch_add(1, Ordering::SeqCst);
        let removed = {
            let mut posts = self.posts.lock().unwrap();
            let before = posts.len();
            posts.retain(|p| p.id != id);
            posts.len() != before
        };
        if removed {
            self.likes.lock().unwrap().retain(|(post_id, _)| post_id != id);
            self.republish();
        }
        Ok(removed)
    }

    async fn posts_by_author(&self, author_id: &str) -> Result<Vec<Post>, StoreError> {
        Ok(self
            .snapshot()
            .posts
            .iter()
            .filter(|p| p.author_id == author_id)
            .cloned()
            .collect())
    }

    async fn like_exists(&self, post_id: &str, user_id: &str) -> Result<bool, StoreError> {
        self.like_delay(post_id).await;
        Ok(self
            .likes
            .lock()
            .unwrap()
            .contains(&(post_id.to_string(), user_id.to_string())))
    }

    async fn like_count(&self, post_id: &str) -> Result<u64, StoreError> {
        self.like_delay(post_id).await;
        Ok(self
            .likes
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == post_id)
            .count() as u64)
    }

    async fn put_like(&self, like: &Like) -> Result<(), StoreError> {
        self.add_like(&like.post_id, &like.user_id);
        Ok(())
    }

    async fn remove_like(&self, post_id: &str, user_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .likes
            .lock()
            .unwrap()
            .remove(&(post_id.to_string(), user_id.to_string())))
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.profile_fetches.fetch_add(1, Ordering::SeqCst);
        let hung = self.hung_profiles.lock().unwrap().contains(user_id);
        if hung {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if self.failing_profiles.lock().unwrap().contains(user_id) {
            return Err(StoreError::Unavailable(format!("profile {}", user_id)));
        }
        Ok(self.profiles.lock().unwrap().get(user_id).cloned())
    }

    async fn put_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, StoreError> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", user_id)))?;
        if let Some(ref name) = update.name {
            profile.name = name.clone();
        }
        if let Some(ref phone) = update.phone {
            profile.phone = phone.clone();
        }
        if let Some(ref image) = update.image {
            profile.image = image.clone();
        }
        Ok(profile.clone())
    }
}
