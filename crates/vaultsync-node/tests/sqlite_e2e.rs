//! End-to-end tests over the SQLite backend.

mod common;

use axum::http::StatusCode;
use common::{json_body, TestApp};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_record_lifecycle() {
    let app = TestApp::with_sqlite();

    let response = app.upload(1, &[("c1", "P1", "h1"), ("c2", "P2", "h2")]).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.update(1, "c1", "P1b", "h1b", 0).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["states"][0]["version"], 1);

    let response = app.delete(1, "c2", 0).await;
    assert_eq!(response.status(), StatusCode::OK);

    let all = app.all_records(1).await;
    assert_eq!(all["length"], 1);
    assert_eq!(all["records"][0]["payload"], "P1b");

    let sync = app.full_sync(1).await;
    assert_eq!(sync["length"], 2);
    let c2 = sync["states"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["client_side_id"] == "c2")
        .unwrap();
    assert_eq!(c2["deleted"], true);
    assert_eq!(c2["version"], 1);

    assert!(app.all_records(2).await["records"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_version_conflict() {
    let app = TestApp::with_sqlite();
    app.upload(1, &[("c1", "P1", "h1")]).await;
    app.update(1, "c1", "P2", "h2", 0).await;

    let response = app.update(1, "c1", "P3", "h3", 0).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let response = app.delete(1, "c1", 5).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let all = app.all_records(1).await;
    assert_eq!(all["records"][0]["payload"], "P2");
    assert_eq!(all["records"][0]["version"], 1);
}

#[tokio::test]
async fn test_failed_batch_rolls_back() {
    let app = TestApp::with_sqlite();
    app.upload(1, &[("c2", "P2", "h2")]).await;

    let response = app
        .upload(1, &[("c1", "P1", "h1"), ("c2", "again", "h2b"), ("c3", "P3", "h3")])
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .call(
            "DELETE",
            "/data/delete",
            Some(&app.token(1)),
            Some(json!({
                "user_id": 1,
                "delete_entries": [
                    { "client_side_id": "c2", "version": 0 },
                    { "client_side_id": "missing", "version": 0 },
                ],
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let sync = app.full_sync(1).await;
    assert_eq!(sync["length"], 1);
    assert_eq!(sync["states"][0]["client_side_id"], "c2");
    assert_eq!(sync["states"][0]["deleted"], false);
    assert_eq!(sync["states"][0]["version"], 0);
}

#[tokio::test]
async fn test_repeated_ids_answered_once() {
    let app = TestApp::with_sqlite();
    app.upload(1, &[("c1", "P1", "h1")]).await;

    let response = app
        .call(
            "POST",
            "/sync/specific",
            Some(&app.token(1)),
            Some(json!({ "user_id": 1, "client_side_ids": ["c1", "c1"] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["length"], 1);

    let response = app
        .call(
            "POST",
            "/data/download",
            Some(&app.token(1)),
            Some(json!({ "user_id": 1, "client_side_ids": ["c1", "c1"] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["length"], 1);
}

#[tokio::test]
async fn test_register_and_login() {
    let app = TestApp::with_sqlite();
    let creds = json!({ "login": "alice", "password": "correct horse battery" });

    let response = app.call("POST", "/user/register", None, Some(creds.clone())).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await["user_id"], 3);

    let response = app.call("POST", "/user/register", None, Some(creds.clone())).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.call("POST", "/user/login", None, Some(creds)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = json_body(response).await["token"].as_str().unwrap().to_string();

    let response = app.call("GET", "/user/encryption-salt", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_one_wins() {
    let app = Arc::new(TestApp::with_sqlite());
    app.upload(1, &[("c1", "P1", "h1")]).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let app = Arc::clone(&app);
        handles.push(tokio::spawn(async move {
            app.update(1, "c1", &format!("P{}", i), &format!("h{}", i), 0)
                .await
                .status()
        }));
    }

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count(), 7);

    let all = app.all_records(1).await;
    assert_eq!(all["records"][0]["version"], 1);
}
