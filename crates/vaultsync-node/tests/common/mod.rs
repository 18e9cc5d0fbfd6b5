//! Shared helpers for the end-to-end tests.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use vaultsync_core::{HasherPool, IntegrityGate};
use vaultsync_node::api::{create_router, AppState};
use vaultsync_node::config::NodeConfig;
use vaultsync_storage::{
    CredentialStore, MemoryStore, Result as StorageResult, SqliteStore, StorageStats, VaultStore,
    VaultTransaction,
};
use vaultsync_types::{Record, RecordState, UserId};

pub const SIGNING_KEY: &str = "test-signing-key-0123456789";
pub const INTEGRITY_KEY: &str = "test-transport-integrity-key";

pub fn test_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.auth.signing_key = SIGNING_KEY.into();
    config.integrity.key = INTEGRITY_KEY.into();
    config.integrity.pool_size = 4;
    config.limits.max_batch_items = 50;
    config.server.max_body_bytes = 64 * 1024;
    config
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    gate: IntegrityGate,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: NodeConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_stores(config, store.clone(), store)
    }

    /// An app over an in-memory SQLite database where users 1 and 2 exist.
    pub fn with_sqlite() -> Self {
        let store = SqliteStore::in_memory().unwrap();
        for login in ["user-one", "user-two"] {
            store.create_user(login, "unused-hash", "unused-salt").unwrap();
        }
        let store = Arc::new(store);
        Self::with_stores(test_config(), store.clone(), store)
    }

    pub fn with_stores(
        config: NodeConfig,
        store: Arc<dyn VaultStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let config = config.validated().unwrap();
        let state = AppState::new(&config, store, credentials).unwrap();
        state.health.set_ready(true);

        Self {
            router: create_router(state.clone()),
            state,
            gate: IntegrityGate::new(HasherPool::new(INTEGRITY_KEY.as_bytes(), 1).unwrap()),
        }
    }

    /// Bearer token for `user`, as the login endpoint would issue it.
    pub fn token(&self, user: u64) -> String {
        self.state
            .accounts
            .tokens()
            .issue(UserId::new(user))
            .unwrap()
            .token
    }

    /// Hex MAC a well-behaved client sends with `items`.
    pub async fn sign<T: Serialize>(&self, items: &[T]) -> String {
        self.gate.sign(items).await.unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        self.send(request(method, uri, token, body)).await
    }

    /// Uploads `(client_side_id, payload, hash)` triples for `user`.
    pub async fn upload(&self, user: u64, items: &[(&str, &str, &str)]) -> Response {
        let list: Vec<Value> = items
            .iter()
            .map(|(c, p, h)| json!({ "client_side_id": c, "payload": p, "hash": h }))
            .collect();
        let typed: Vec<vaultsync_types::NewRecord> =
            serde_json::from_value(Value::Array(list.clone())).unwrap();
        let hash = self.sign(&typed).await;

        self.call(
            "POST",
            "/data/",
            Some(&self.token(user)),
            Some(json!({
                "user_id": user,
                "payload_list": list,
                "length": list.len(),
                "hash": hash,
            })),
        )
        .await
    }

    /// Updates one record of `user`.
    pub async fn update(&self, user: u64, id: &str, payload: &str, hash: &str, version: u64) -> Response {
        let items = vec![vaultsync_types::RecordUpdate {
            client_side_id: id.into(),
            payload: payload.into(),
            hash: hash.into(),
            version: Some(version),
        }];
        let mac = self.sign(&items).await;

        self.call(
            "PUT",
            "/data/update",
            Some(&self.token(user)),
            Some(json!({
                "user_id": user,
                "private_data_updates": items,
                "hash": mac,
            })),
        )
        .await
    }

    /// Tombstones one record of `user`.
    pub async fn delete(&self, user: u64, id: &str, version: u64) -> Response {
        self.call(
            "DELETE",
            "/data/delete",
            Some(&self.token(user)),
            Some(json!({
                "user_id": user,
                "delete_entries": [{ "client_side_id": id, "version": version }],
                "length": 1,
            })),
        )
        .await
    }

    pub async fn all_records(&self, user: u64) -> Value {
        let response = self.call("GET", "/data/all", Some(&self.token(user)), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await
    }

    pub async fn full_sync(&self, user: u64) -> Value {
        let response = self.call("GET", "/sync/", Some(&self.token(user)), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await
    }
}

/// Memory store whose write transactions take `delay` to open.
pub struct SlowStore {
    pub inner: MemoryStore,
    pub delay: Duration,
}

impl VaultStore for SlowStore {
    fn begin(&self, user_id: UserId) -> StorageResult<Box<dyn VaultTransaction + '_>> {
        std::thread::sleep(self.delay);
        self.inner.begin(user_id)
    }

    fn live_records(&self, user_id: UserId) -> StorageResult<Vec<Record>> {
        self.inner.live_records(user_id)
    }

    fn live_records_by_ids(&self, user_id: UserId, ids: &[String]) -> StorageResult<Vec<Record>> {
        self.inner.live_records_by_ids(user_id, ids)
    }

    fn states(&self, user_id: UserId) -> StorageResult<Vec<RecordState>> {
        self.inner.states(user_id)
    }

    fn states_by_ids(&self, user_id: UserId, ids: &[String]) -> StorageResult<Vec<RecordState>> {
        self.inner.states_by_ids(user_id, ids)
    }

    fn stats(&self) -> StorageResult<StorageStats> {
        self.inner.stats()
    }
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn json_body(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn text_body(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
