//! End-to-end tests for the REST API.
//!
//! The router is assembled the same way `main.rs` does it (metrics
//! middleware, concurrency limit, CORS) over a fresh RocksDB per test.
//!
//! Run with: `cargo test --test api_tests`

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Datelike, Utc};
use http_body_util::BodyExt;
use serde_json::json;
use tempfile::TempDir;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceExt;

use user_segments::{
    config::ServerConfig,
    handlers::{build_router, SegmentService},
    middleware::track_metrics,
};

// ═══════════════════════════════════════════════════════════════════════
// Test infrastructure
// ═══════════════════════════════════════════════════════════════════════

/// Self-contained test harness with a fresh temp directory and RocksDB.
struct Harness {
    service: Arc<SegmentService>,
    cfg: ServerConfig,
    _dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let cfg = ServerConfig {
            storage_path: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let service = SegmentService::new(cfg.clone()).expect("create SegmentService");
        Self {
            service: Arc::new(service),
            cfg,
            _dir: dir,
        }
    }

    fn app(&self) -> Router {
        // Mirror main.rs layering.
        build_router(self.service.clone())
            .layer(axum::middleware::from_fn(track_metrics))
            .layer(ConcurrencyLimitLayer::new(self.cfg.max_concurrent_requests))
            .layer(self.cfg.cors.to_layer())
    }

    async fn user(&self, name: &str) -> u64 {
        let (status, _) = json_of(self.app(), post("/users", json!({ "name": name }))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, users) = json_of(self.app(), get("/users")).await;
        users
            .as_array()
            .unwrap()
            .iter()
            .rev()
            .find(|u| u["name"] == name)
            .and_then(|u| u["id"].as_u64())
            .unwrap()
    }

    async fn segment(&self, name: &str) {
        let (status, _) = json_of(self.app(), post("/segments", json!({ "name": name }))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    async fn reconcile(
        &self,
        user_id: u64,
        add: &[&str],
        remove: &[&str],
    ) -> (StatusCode, serde_json::Value) {
        json_of(
            self.app(),
            post(
                "/user-segments",
                json!({ "user-id": user_id, "segments": add, "segments-for-delete": remove }),
            ),
        )
        .await
    }
}

// ── request helpers ──

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get_with_body(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// ── response helpers ──

async fn status_of(app: Router, req: Request<Body>) -> StatusCode {
    app.oneshot(req).await.unwrap().status()
}

async fn json_of(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let val = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).to_string())
        })
    };
    (status, val)
}

async fn csv_of(app: Router, year: i32, month: u32) -> (StatusCode, String) {
    let resp = app
        .oneshot(get_with_body(
            "/csv-report",
            json!({ "year": year, "month": month }),
        ))
        .await
        .unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn messages(body: &serde_json::Value) -> Vec<(String, String)> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|item| {
            (
                item["status"].as_str().unwrap().to_string(),
                item["message"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Reconcile
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn reconcile_add_then_duplicate_add() {
    let h = Harness::new();
    let uid = h.user("alice").await;
    h.segment("vip").await;

    let (status, body) = h.reconcile(uid, &["vip"], &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        messages(&body),
        vec![(
            "success".to_string(),
            format!("Segment 'vip' for user '{uid}' was added")
        )]
    );

    let (status, body) = h.reconcile(uid, &["vip"], &[]).await;
    assert_eq!(status, StatusCode::OK);
    let items = messages(&body);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].0, "error");
    assert!(items[0].1.contains("already exists"));

    let (_, body) = json_of(h.app(), get(&format!("/user-segments/{uid}"))).await;
    assert_eq!(body["segment-names"], "vip");
}

#[tokio::test]
async fn reconcile_add_and_remove_same_segment() {
    let h = Harness::new();
    let uid = h.user("alice").await;
    h.segment("vip").await;

    let (status, body) = h.reconcile(uid, &["vip"], &["vip"]).await;
    assert_eq!(status, StatusCode::OK);
    let items = messages(&body);
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|(s, _)| s == "success"));
    assert!(items[0].1.ends_with("was added"));
    assert!(items[1].1.ends_with("was deleted"));

    assert_eq!(
        status_of(h.app(), get(&format!("/user-segments/{uid}"))).await,
        StatusCode::NOT_FOUND
    );

    let now = Utc::now();
    let (status, csv) = csv_of(h.app(), now.year(), now.month()).await;
    assert_eq!(status, StatusCode::OK);
    let rows: Vec<&str> = csv.lines().skip(1).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].starts_with(&format!("{uid},add,vip,")));
    assert!(rows[1].starts_with(&format!("{uid},remove,vip,")));
}

#[tokio::test]
async fn reconcile_remove_non_member_writes_no_history() {
    let h = Harness::new();
    let uid = h.user("alice").await;
    h.segment("vip").await;

    let (status, body) = h.reconcile(uid, &[], &["vip"]).await;
    assert_eq!(status, StatusCode::OK);
    let items = messages(&body);
    assert_eq!(items[0].0, "error");
    assert!(items[0].1.starts_with("There is no segment"));

    let now = Utc::now();
    let (_, csv) = csv_of(h.app(), now.year(), now.month()).await;
    assert_eq!(csv.lines().count(), 1);
}

#[tokio::test]
async fn reconcile_unknown_user_changes_nothing() {
    let h = Harness::new();
    h.segment("vip").await;

    let (status, body) = h.reconcile(404, &["vip"], &["vip"]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        messages(&body),
        vec![("error".to_string(), "User '404' does not exist!".to_string())]
    );

    let (_, all) = json_of(h.app(), get("/user-segments")).await;
    assert_eq!(all, json!([]));
}

#[tokio::test]
async fn reconcile_names_match_case_insensitively() {
    let h = Harness::new();
    let uid = h.user("alice").await;
    h.segment("vip").await;
    h.segment("vip_gold").await;

    let (_, body) = h.reconcile(uid, &["Vip"], &[]).await;
    assert_eq!(messages(&body)[0].0, "success");

    let (_, body) = json_of(h.app(), get(&format!("/user-segments/{uid}"))).await;
    assert_eq!(body["segment-names"], "vip");
}

#[tokio::test]
async fn reconcile_replay_is_safe() {
    let h = Harness::new();
    let uid = h.user("alice").await;
    h.segment("a").await;
    h.segment("b").await;

    let (_, first) = h.reconcile(uid, &["a"], &["b"]).await;
    let first = messages(&first);
    assert_eq!(first[0].0, "success");
    assert_eq!(first[1].0, "error");

    let (status, second) = h.reconcile(uid, &["a"], &["b"]).await;
    assert_eq!(status, StatusCode::OK);
    let second = messages(&second);
    assert!(second[0].1.contains("already exists"));
    assert!(second[1].1.starts_with("There is no segment"));

    let now = Utc::now();
    let (_, csv) = csv_of(h.app(), now.year(), now.month()).await;
    assert_eq!(csv.lines().count(), 2, "only the first add is in history");
}

#[tokio::test]
async fn reconcile_rejects_malformed_body() {
    let h = Harness::new();
    let status = status_of(h.app(), post("/user-segments", json!({ "segments": ["vip"] }))).await;
    assert!(status.is_client_error());
}

// ═══════════════════════════════════════════════════════════════════════
// Catalog cascades
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn deleting_segment_drops_memberships_keeps_history() {
    let h = Harness::new();
    let uid = h.user("alice").await;
    h.segment("vip").await;
    h.segment("sale").await;
    h.reconcile(uid, &["vip", "sale"], &[]).await;

    let (status, body) = json_of(h.app(), delete("/segments/vip")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (_, body) = json_of(h.app(), get(&format!("/user-segments/{uid}"))).await;
    assert_eq!(body["segment-names"], "sale");

    let now = Utc::now();
    let (_, csv) = csv_of(h.app(), now.year(), now.month()).await;
    assert!(csv.contains(",add,vip,"));
}

#[tokio::test]
async fn deleting_user_drops_memberships() {
    let h = Harness::new();
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    h.segment("vip").await;
    h.reconcile(alice, &["vip"], &[]).await;
    h.reconcile(bob, &["vip"], &[]).await;

    assert_eq!(
        status_of(h.app(), delete(&format!("/users/{alice}"))).await,
        StatusCode::OK
    );

    let (_, all) = json_of(h.app(), get("/user-segments")).await;
    assert_eq!(all, json!([{ "user-id": bob, "segment-names": "vip" }]));

    let (status, _) = h.reconcile(alice, &["vip"], &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ═══════════════════════════════════════════════════════════════════════
// Reports
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn csv_report_headers() {
    let h = Harness::new();
    let resp = h
        .app()
        .oneshot(get_with_body("/csv-report", json!({ "year": 2023, "month": 8 })))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"report-2023-8.csv\""
    );
}

#[tokio::test]
async fn csv_report_other_month_is_empty() {
    let h = Harness::new();
    let uid = h.user("alice").await;
    h.segment("vip").await;
    h.reconcile(uid, &["vip"], &[]).await;

    let (status, csv) = csv_of(h.app(), 1999, 1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(csv, "User,Action,Segment,Date\n");
}

#[tokio::test]
async fn csv_report_requires_period() {
    let h = Harness::new();
    assert!(status_of(h.app(), get("/csv-report")).await.is_client_error());
}

// ═══════════════════════════════════════════════════════════════════════
// Infrastructure
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn health_endpoints() {
    let h = Harness::new();
    assert_eq!(status_of(h.app(), get("/health")).await, StatusCode::OK);
    assert_eq!(status_of(h.app(), get("/health/live")).await, StatusCode::OK);
    assert_eq!(status_of(h.app(), get("/health/ready")).await, StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let h = Harness::new();
    assert_eq!(
        status_of(h.app(), get("/no-such-route")).await,
        StatusCode::NOT_FOUND
    );
}
