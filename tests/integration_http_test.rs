// Serve the router on a real socket and talk to it over HTTP

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use notes_server::{app, db};

async fn spawn_server() -> String {
    let pool = db::init_db("sqlite::memory:").await.expect("Failed to connect to test database");
    db::migrate(&pool).await.expect("Failed to run migrations");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app(pool)).await.expect("server error");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_server_note_roundtrip() {
    let base = spawn_server().await;
    let client = Client::new();

    let health: Value = client.get(format!("{base}/health")).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");

    let resp = client
        .post(format!("{base}/api/notes"))
        .json(&json!({ "title": "over http", "content": "integration http test note", "tags": "http" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let note: Value = resp.json().await.unwrap();

    let resp = client
        .delete(format!("{base}/api/notes/{}", note["id"]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let history: Value = client.get(format!("{base}/api/history")).send().await.unwrap().json().await.unwrap();
    assert_eq!(history[0]["originalId"], note["id"]);

    // no body at all is still a validation error, not a crash
    let resp = client.post(format!("{base}/api/notes")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
