//! Shared harness: drives the router in-process over in-memory backends

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use swapstreet::{create_router, AppConfig, AppState};
use tower::ServiceExt;

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-image-bytes";
const BOUNDARY: &str = "swapstreet-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

/// Registered account
pub struct TestUser {
    pub id: String,
    pub username: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig::for_testing())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let state = Arc::new(AppState::in_memory(config).unwrap());
        Self {
            router: create_router(state.clone()),
            state,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, body)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn register(&self, username: &str) -> TestUser {
        let (status, body) = self
            .post(
                "/api/auth/register",
                None,
                json!({
                    "email": format!("{}@example.com", username),
                    "username": username,
                    "password": "hunter22secret",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

        let data = &body["data"];
        TestUser {
            id: data["user"]["id"].as_str().unwrap().to_string(),
            username: username.to_string(),
            access_token: data["access_token"].as_str().unwrap().to_string(),
            refresh_token: data["refresh_token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn upload(&self, token: &str, content_type: &str, data: &[u8]) -> (StatusCode, Value) {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"photo\"\r\nContent-Type: {ct}\r\n\r\n",
                b = BOUNDARY,
                ct = content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/images")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Upload a PNG and return its key
    pub async fn upload_png(&self, token: &str) -> String {
        let (status, body) = self.upload(token, "image/png", PNG).await;
        assert_eq!(status, StatusCode::CREATED, "upload failed: {}", body);
        body["data"]["key"].as_str().unwrap().to_string()
    }

    /// Create a listing with one fresh image; returns the listing JSON
    pub async fn create_listing(&self, user: &TestUser, title: &str, price_cents: i64) -> Value {
        let key = self.upload_png(&user.access_token).await;
        let (status, body) = self
            .post(
                "/api/listings",
                Some(&user.access_token),
                json!({
                    "title": title,
                    "description": "Worn a handful of times",
                    "price_cents": price_cents,
                    "category": "Jackets",
                    "size": "M",
                    "condition": "good",
                    "image_keys": [key],
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create listing failed: {}", body);
        body["data"].clone()
    }
}

pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}
