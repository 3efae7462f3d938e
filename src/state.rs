use std::sync::Arc;

use crate::auth::{AuthProvider, SqliteAuthProvider};
use crate::config::Config;
use crate::db::DbPool;
use crate::feed::FeedAggregator;
use crate::store::{DocumentStore, SqliteDocumentStore};
use crate::upload::UploadStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub feed: FeedAggregator,
    pub uploads: Arc<UploadStore>,
}

impl AppState {
    /// Wire the SQLite-backed collaborators around an already migrated pool.
    pub fn build(config: Config, pool: DbPool) -> anyhow::Result<Self> {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(pool.clone())?);

        let auth = SqliteAuthProvider::new(
            pool,
            store.clone(),
            config.auth.session_hours,
            config.auth.reset_token_minutes,
        )
        .with_hash_cost(config.auth.bcrypt_cost);

        let feed = FeedAggregator::new(store.clone(), &config.feed);
        let uploads = UploadStore::new(config.uploads_path(), config.public_base_url()?);

        Ok(Self {
            config,
            store,
            auth: Arc::new(auth),
            feed,
            uploads: Arc::new(uploads),
        })
    }
}
