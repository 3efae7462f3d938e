use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt as _;

use crate::db::models::{NewPost, Post};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::feed::{FeedView, LikeToggle};
use crate::state::AppState;

pub const INCOMPLETE_POST: &str = "Preencha todos os campos antes de publicar.";
pub const DELETE_NOT_CONFIRMED: &str = "Confirme a remoção do post.";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
}

#[derive(Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub confirm: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/feed", get(feed))
        .route("/api/feed/live", get(live_feed))
        .route("/api/posts", post(create_post))
        .route("/api/posts/{id}", delete(delete_post))
        .route("/api/posts/{id}/like", post(toggle_like))
}

/// GET /api/feed: one enrichment pass for the caller.
async fn feed(State(state): State<AppState>, user: CurrentUser) -> Json<FeedView> {
    Json(state.feed.render(&user.id).await)
}

/// GET /api/feed/live: one `feed` event per published view.
///
/// The session's aggregation task lives exactly as long as the stream, so a
/// client disconnect stops re-aggregation for that viewer.
async fn live_feed(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let session = state.feed.open_session(user.id);
    tracing::debug!(viewer_id = session.viewer_id(), "live feed opened");

    let views = WatchStream::new(session.subscribe());
    let stream = views.filter_map(move |view| {
        let _session = &session;
        view.map(|view| Event::default().event("feed").json_data(&*view))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// POST /api/posts
async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let new = new_post(&user.id, req)?;
    let post = state.store.create_post(new).await?;
    tracing::info!(post_id = %post.id, user_id = %user.id, "post published");
    Ok((StatusCode::CREATED, Json(post)))
}

/// DELETE /api/posts/{id}?confirm=true
async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> AppResult<StatusCode> {
    if !params.confirm {
        return Err(AppError::Validation(DELETE_NOT_CONFIRMED.to_string()));
    }
    state.feed.delete_post(&id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/posts/{id}/like
async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<LikeToggle>> {
    Ok(Json(state.feed.toggle_like(&id, &user.id).await?))
}

/// Every field is required; the author is always the caller.
fn new_post(author_id: &str, req: CreatePostRequest) -> AppResult<NewPost> {
    let image_url = req.image_url.trim();
    let description = req.description.trim();
    let location = req.location.trim();
    if image_url.is_empty() || description.is_empty() || location.is_empty() {
        return Err(AppError::Validation(INCOMPLETE_POST.to_string()));
    }
    Ok(NewPost {
        author_id: author_id.to_string(),
        image_url: image_url.to_string(),
        description: description.to_string(),
        location: location.to_string(),
    })
}
