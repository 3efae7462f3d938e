//! Feed aggregation: posts snapshot in, enriched rows out.

mod aggregator;
mod enrich;
#[cfg(test)]
mod testing;

use serde::Serialize;
use thiserror::Error;

use crate::db::models::{Post, UserProfile};
use crate::store::StoreError;

pub use aggregator::{FeedAggregator, FeedSession, LikeToggle};
pub use enrich::Enricher;

/// Name shown when an author's profile can't be resolved.
pub const PLACEHOLDER_AUTHOR_NAME: &str = "Usuário";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Only the author can delete this post")]
    NotOwner,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedAuthor {
    pub id: String,
    pub name: String,
    pub image: String,
    /// True when the profile lookup failed or found nothing.
    pub placeholder: bool,
}

impl FeedAuthor {
    pub fn from_profile(profile: UserProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name,
            image: profile.image,
            placeholder: false,
        }
    }

    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: PLACEHOLDER_AUTHOR_NAME.to_string(),
            image: String::new(),
            placeholder: true,
        }
    }
}

/// Display-ready post.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRow {
    pub post: Post,
    pub author: FeedAuthor,
    pub liked: bool,
    pub like_count: u64,
    pub is_owner: bool,
}

/// One complete enrichment pass. Published as a unit, never patched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedView {
    /// Sequence number of the snapshot this view was built from.
    pub seq: u64,
    pub rows: Vec<FeedRow>,
}
