//! Drives a real listener over TCP: upload a photo, publish it, like it,
//! then fetch the image back from the URL the server handed out.

mod common;

use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;

use common::{build, test_config, PASSWORD};

#[tokio::test]
async fn test_upload_publish_and_like_over_http() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{}", addr);

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.server.public_url = Some(base.clone());
    let app = build(dir, config);

    let router = app.router.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client = reqwest::Client::new();

    // Upload
    let form = reqwest::multipart::Form::new().part(
        "photo",
        reqwest::multipart::Part::bytes(b"jpeg over the wire".to_vec())
            .file_name("treino.jpg")
            .mime_str("image/jpeg")
            .unwrap(),
    );
    let response = client
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let uploaded: Value = response.json().await.unwrap();
    let url = uploaded["url"].as_str().unwrap().to_string();
    assert!(url.starts_with(&format!("{}/uploads/", base)));

    // The returned URL is directly fetchable
    let bytes = client.get(&url).send().await.unwrap().bytes().await.unwrap();
    assert_eq!(&bytes[..], b"jpeg over the wire");

    // Register and publish with the uploaded image
    let grant: Value = client
        .post(format!("{}/api/auth/register", base))
        .json(&json!({ "email": "ana@treinos.app", "password": PASSWORD }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = grant["token"].as_str().unwrap().to_string();

    let response = client
        .post(format!("{}/api/posts", base))
        .bearer_auth(&token)
        .json(&json!({
            "imageUrl": url,
            "description": "Treino de perna",
            "location": "Curitiba",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let post: Value = response.json().await.unwrap();

    let toggle: Value = client
        .post(format!("{}/api/posts/{}/like", base, post["id"].as_str().unwrap()))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(toggle, json!({ "liked": true, "likeCount": 1 }));

    let feed: Value = client
        .get(format!("{}/api/feed", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(feed["rows"][0]["post"]["imageUrl"], url.as_str());
    assert_eq!(feed["rows"][0]["liked"], true);
    assert_eq!(feed["rows"][0]["isOwner"], true);

    // The live feed opens with the current view
    let mut live = client
        .get(format!("{}/api/feed/live", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(live.status(), 200);
    let mut buffer = String::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !buffer.contains("\n\n") {
            let chunk = live.chunk().await.unwrap().expect("live feed closed");
            buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .expect("no feed event within 5s");
    assert!(buffer.contains("event: feed"), "got: {}", buffer);
    assert!(buffer.contains(post["id"].as_str().unwrap()));

    server.abort();
}
