use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use tower_http::services::ServeDir;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::upload::UPLOADS_ROUTE;

/// Multipart field the client sends the image in.
pub const PHOTO_FIELD: &str = "photo";

pub const MISSING_FILE: &str = "Arquivo não enviado";
pub const TOO_MANY_FILES: &str = "Envie apenas um arquivo";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(
                state.config.storage.max_upload_bytes(),
            )),
        )
        .nest_service(
            &format!("/{}", UPLOADS_ROUTE),
            ServeDir::new(state.uploads.dir()),
        )
}

/// POST /upload: store the `photo` part and return its public URL.
async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<UploadResponse>> {
    // Not multipart at all: same outcome as a form without the file
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("upload without multipart body: {}", e);
        AppError::BadRequest(MISSING_FILE.to_string())
    })?;

    let mut photo: Option<(String, Bytes)> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(PHOTO_FIELD) {
            continue;
        }
        // A part without a filename is a text field, even if it's called photo
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if photo.is_some() {
            return Err(AppError::BadRequest(TOO_MANY_FILES.to_string()));
        }
        let data = field.bytes().await.map_err(multipart_error)?;
        photo = Some((name, data));
    }

    let (name, data) = photo.ok_or_else(|| AppError::BadRequest(MISSING_FILE.to_string()))?;
    let stored = state.uploads.save(&name, data).await?;

    Ok(Json(UploadResponse { url: stored.url }))
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(err.body_text())
    }
}
