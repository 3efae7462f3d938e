use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::AuthGrant;
use crate::config::AuthConfig;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetConfirmRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/password-reset", post(request_reset))
        .route("/api/auth/password-reset/confirm", post(confirm_reset))
}

// -- Cookie helpers --

fn session_cookie(config: &AuthConfig, token: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        config.cookie_name,
        token,
        config.session_hours * 3600
    )
}

fn clear_session_cookie(config: &AuthConfig) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        config.cookie_name
    )
}

fn granted(config: &AuthConfig, grant: AuthGrant) -> Response {
    (
        [(header::SET_COOKIE, session_cookie(config, &grant.token))],
        Json(grant),
    )
        .into_response()
}

// -- Handlers --

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> AppResult<Response> {
    let grant = state.auth.sign_up(&req.email, &req.password).await?;
    tracing::info!(user_id = %grant.identity.user_id, "account registered");
    Ok(granted(&state.config.auth, grant))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> AppResult<Response> {
    let grant = state.auth.sign_in(&req.email, &req.password).await?;
    Ok(granted(&state.config.auth, grant))
}

/// POST /api/auth/logout
async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    state.auth.sign_out(&user.token).await?;
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_session_cookie(&state.config.auth))],
    )
        .into_response())
}

/// POST /api/auth/password-reset: always 202 for a well-formed address.
async fn request_reset(
    State(state): State<AppState>,
    Json(req): Json<ResetRequest>,
) -> AppResult<StatusCode> {
    state.auth.send_password_reset(&req.email).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/auth/password-reset/confirm
async fn confirm_reset(
    State(state): State<AppState>,
    Json(req): Json<ResetConfirmRequest>,
) -> AppResult<StatusCode> {
    state.auth.reset_password(&req.token, &req.password).await?;
    Ok(StatusCode::NO_CONTENT)
}
