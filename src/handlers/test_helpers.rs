//! Shared test utilities for handler unit tests.
//!
//! Provides a [`TestHarness`] backed by a fresh RocksDB in a temp directory,
//! plus helpers for building requests and reading response bodies.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt; // for oneshot()

use super::router::build_router;
use super::state::SegmentService;
use crate::config::ServerConfig;
use crate::store::{Segment, User};

/// A self-contained test environment with its own temp storage.
///
/// Holds `TempDir` so the directory isn't cleaned up until the harness drops.
pub struct TestHarness {
    pub service: Arc<SegmentService>,
    _temp_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config = ServerConfig {
            storage_path: temp_dir.path().to_path_buf(),
            ..ServerConfig::default()
        };

        let service = SegmentService::new(config).expect("failed to create test SegmentService");

        Self {
            service: Arc::new(service),
            _temp_dir: temp_dir,
        }
    }

    /// Build the full application router.
    pub fn router(&self) -> Router {
        build_router(self.service.clone())
    }

    /// Seed a user directly through the store.
    pub fn create_user(&self, name: &str) -> User {
        self.service.store().create_user(name).unwrap()
    }

    /// Seed a segment directly through the store.
    pub fn create_segment(&self, name: &str) -> Segment {
        self.service.store().create_segment(name).unwrap()
    }
}

// ---------- Request builders ----------

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// GET with a JSON body (the report endpoint takes its period this way).
pub fn get_json_body<T: serde::Serialize>(uri: &str, body: &T) -> Request<Body> {
    json_request(Method::GET, uri, body)
}

pub fn post_json<T: serde::Serialize>(uri: &str, body: &T) -> Request<Body> {
    json_request(Method::POST, uri, body)
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request<T: serde::Serialize>(method: Method, uri: &str, body: &T) -> Request<Body> {
    let json = serde_json::to_string(body).unwrap();
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json))
        .unwrap()
}

// ---------- Response helpers ----------

/// Status, headers and undecoded body of a response.
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

pub async fn send_raw(app: Router, req: Request<Body>) -> RawResponse {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.into_body().collect().await.unwrap().to_bytes().to_vec();
    RawResponse {
        status,
        headers,
        body,
    }
}

/// Send a request through the router and return (status, JSON body).
pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = send_raw(app, req).await;
    let json: serde_json::Value = if resp.body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&resp.body).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&resp.body).to_string())
        })
    };
    (resp.status, json)
}
