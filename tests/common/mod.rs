#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use treinos::auth::MIN_BCRYPT_COST;
use treinos::config::Config;
use treinos::state::AppState;
use treinos::{db, routes};

pub const PASSWORD: &str = "Treino#2024";
pub const BOUNDARY: &str = "treinos-test-boundary";
pub const PUBLIC_URL: &str = "http://192.168.3.3:3000";

pub struct TestApp {
    pub dir: TempDir,
    pub state: AppState,
    pub router: Router,
}

pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.database.path = Some(dir.path().join("test.db"));
    config.storage.path = Some(dir.path().join("uploads"));
    config.server.public_url = Some(PUBLIC_URL.to_string());
    config.auth.bcrypt_cost = MIN_BCRYPT_COST;
    config
}

pub fn test_app() -> TestApp {
    test_app_with(|_| {})
}

pub fn test_app_with(customize: impl FnOnce(&mut Config)) -> TestApp {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    customize(&mut config);
    build(dir, config)
}

pub fn build(dir: TempDir, config: Config) -> TestApp {
    std::fs::create_dir_all(config.uploads_path()).unwrap();
    let pool = db::create_pool(&config.db_path()).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let state = AppState::build(config, pool).unwrap();
    let router = routes::build_router(state.clone());
    TestApp { dir, state, router }
}

impl TestApp {
    pub fn uploaded_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.state.config.uploads_path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn register(&self, email: &str) -> (String, String) {
        let (status, body) = self
            .send(json_request(
                "POST",
                "/api/auth/register",
                None,
                serde_json::json!({ "email": email, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "register failed: {}", body);
        (
            body["user_id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// One multipart part: field name, optional filename, content.
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub data: &'a [u8],
}

pub fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/jpeg\r\n\r\n",
                    part.name, filename
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                    .as_bytes(),
            ),
        }
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(parts: &[Part]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}
