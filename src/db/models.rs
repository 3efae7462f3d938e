use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A published workout post. Only its author may delete it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    #[serde(rename = "userId")]
    pub author_id: String,
    pub image_url: String,
    pub description: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    #[serde(default, rename = "userId")]
    pub author_id: String,
    pub image_url: String,
    pub description: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub post_id: String,
    pub user_id: String,
    pub liked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub image: String,
    pub email: String,
}

impl UserProfile {
    /// The document written at registration: only the email is known.
    pub fn empty(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub image: Option<String>,
}

pub fn to_micros(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_micros()
}

pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}
