/// Common test utilities for API integration tests
///
/// Builds the full router over in-memory backends so tests need neither
/// PostgreSQL nor Redis, and records every span for inspection.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tower::Service as _;
use usersvc_api::app::{build_router, AppState};
use usersvc_api::config::Config;
use usersvc_shared::cache::InMemoryCache;
use usersvc_shared::store::InMemoryCredentialStore;
use usersvc_shared::telemetry::RecordingSink;

pub const JWT_SECRET: &str = "test-secret-key-at-least-32-bytes-long";

/// Test context containing all necessary resources
pub struct TestContext {
    pub app: Router,
    pub store: Arc<InMemoryCredentialStore>,
    pub cache: Arc<InMemoryCache>,
    pub spans: Arc<RecordingSink>,
}

impl TestContext {
    pub fn new() -> Self {
        let config = Config::from_lookup(|key| match key {
            "JWT_SECRET" => Some(JWT_SECRET.to_string()),
            "STORAGE_BACKEND" => Some("memory".to_string()),
            _ => None,
        })
        .unwrap();

        let store = Arc::new(InMemoryCredentialStore::new());
        let cache = Arc::new(InMemoryCache::new());
        let spans = Arc::new(RecordingSink::new());

        let state = AppState::new(config, store.clone(), cache.clone(), spans.clone());

        Self {
            app: build_router(state),
            store,
            cache,
            spans,
        }
    }

    /// Sends a request and returns status plus parsed JSON body
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.call(request).await
    }

    /// Sends a prepared request
    pub async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().call(request).await.unwrap();
        let status = response.status();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                panic!("Non-JSON body ({}): {}", status, String::from_utf8_lossy(&bytes))
            })
        };

        (status, json)
    }

    /// Registers a user and returns its id
    pub async fn register(&self, email: &str, username: &str, role: Option<&str>) -> String {
        let mut body = serde_json::json!({
            "email": email,
            "username": username,
            "password": "correct horse battery staple",
        });
        if let Some(role) = role {
            body["role"] = Value::from(role);
        }

        let (status, json) = self.send("POST", "/api/auth/register", None, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", json);
        json["user_id"].as_str().unwrap().to_string()
    }

    /// Logs in and returns the bearer token
    pub async fn login(&self, email: &str) -> String {
        let (status, json) = self
            .send(
                "POST",
                "/api/auth/login",
                None,
                Some(serde_json::json!({
                    "email": email,
                    "password": "correct horse battery staple",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", json);
        json["token"].as_str().unwrap().to_string()
    }
}
