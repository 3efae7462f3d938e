use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::db::models::{Post, ProfileUpdate, UserProfile};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/profile", get(own_profile).put(update_profile))
        .route("/api/users/{id}", get(user_profile))
        .route("/api/users/{id}/posts", get(user_posts))
}

async fn load_profile(state: &AppState, user_id: &str) -> AppResult<UserProfile> {
    state
        .store
        .get_profile(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("profile {}", user_id)))
}

/// GET /api/profile
async fn own_profile(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(load_profile(&state, &user.id).await?))
}

/// PUT /api/profile: only the fields present in the body change.
async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Json<UserProfile>> {
    let profile = state.store.update_profile(&user.id, &update).await?;
    tracing::debug!(user_id = %user.id, "profile updated");
    Ok(Json(profile))
}

/// GET /api/users/{id}
async fn user_profile(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(load_profile(&state, &id).await?))
}

/// GET /api/users/{id}/posts: newest first.
async fn user_posts(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Post>>> {
    Ok(Json(state.store.posts_by_author(&id).await?))
}
