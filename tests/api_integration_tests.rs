//! Integration Tests for the Admin API
//!
//! Tests the full request/response cycle for each endpoint against a
//! service backed by the in-process remote store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use layered_cache::api::create_router;
use layered_cache::remote::{MemoryStore, RemoteStore};
use layered_cache::{AppState, CacheService, Config};
use serde_json::Value;
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = CacheService::new(
        &Config::default(),
        Arc::clone(&store) as Arc<dyn RemoteStore>,
    );
    (create_router(AppState::new(Arc::new(service))), store)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn put_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// == Cache Endpoint Tests ==

#[tokio::test]
async fn test_set_then_get() {
    let (app, _store) = create_test_app();

    let response = app
        .clone()
        .oneshot(put_json("/cache", r#"{"key":"greeting","value":"hello"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["key"], "greeting");

    let response = app.oneshot(get("/cache/greeting")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["value"], "hello");
}

#[tokio::test]
async fn test_get_missing_key() {
    let (app, _store) = create_test_app();

    let response = app.oneshot(get("/cache/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["kind"], "not_found");
}

#[tokio::test]
async fn test_set_empty_key_rejected() {
    let (app, store) = create_test_app();

    let response = app
        .oneshot(put_json("/cache", r#"{"key":"","value":"x"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["kind"], "validation");
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_set_oversized_value_rejected() {
    let (app, _store) = create_test_app();
    let body = format!(
        r#"{{"key":"big","value":"{}"}}"#,
        "x".repeat(Config::default().max_value_size + 1)
    );

    let response = app.oneshot(put_json("/cache", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_removes_from_both_layers() {
    let (app, store) = create_test_app();
    app.clone()
        .oneshot(put_json("/cache", r#"{"key":"doomed","value":"x"}"#))
        .await
        .unwrap();
    assert!(store.raw("doomed").is_some());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/cache/doomed")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.raw("doomed").is_none());

    let response = app.oneshot(get("/cache/doomed")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// == Invalidation Endpoint Tests ==

#[tokio::test]
async fn test_invalidate_tags_endpoint() {
    let (app, store) = create_test_app();
    for i in 0..3 {
        let body = format!(
            r#"{{"key":"app:recipe:{}","value":"r","tags":["recipes"]}}"#,
            i
        );
        app.clone().oneshot(put_json("/cache", &body)).await.unwrap();
    }

    let response = app
        .clone()
        .oneshot(post_json("/invalidate/tags", r#"{"tags":["recipes"]}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["clean"], true);
    assert_eq!(json["keys_found"], 3);
    assert_eq!(json["l2_removed"], 3);

    assert!(store.is_empty());
    let response = app.oneshot(get("/cache/app:recipe:0")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalidate_tags_requires_tags() {
    let (app, _store) = create_test_app();

    let response = app
        .oneshot(post_json("/invalidate/tags", r#"{"tags":[]}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalidate_pattern_endpoint() {
    let (app, store) = create_test_app();
    for key in ["app:user:1", "app:user:2", "app:recipe:1"] {
        let body = format!(r#"{{"key":"{}","value":"v"}}"#, key);
        app.clone().oneshot(put_json("/cache", &body)).await.unwrap();
    }

    let response = app
        .oneshot(post_json("/invalidate/pattern", r#"{"pattern":"app:user:*"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["l1_removed"], 2);
    assert_eq!(json["l2_removed"], 2);
    assert!(store.raw("app:recipe:1").is_some());
}

// == Stats and Health Endpoint Tests ==

#[tokio::test]
async fn test_stats_endpoint_shape() {
    let (app, _store) = create_test_app();
    app.clone()
        .oneshot(put_json("/cache", r#"{"key":"k","value":"v"}"#))
        .await
        .unwrap();
    app.clone().oneshot(get("/cache/k")).await.unwrap();

    let response = app.clone().oneshot(get("/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["service"]["l1_hits"], 1);
    assert_eq!(json["local"]["entries"], 1);
    assert_eq!(json["remote"]["breaker"]["state"], "closed");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/stats/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["service"]["total_ops"], 0);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, store) = create_test_app();

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert!(json.get("timestamp").is_some());

    store.set_failing(true);
    let response = app.oneshot(get("/health")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "degraded");
}

#[tokio::test]
async fn test_remote_outage_surfaces_as_bad_gateway() {
    let (app, store) = create_test_app();
    store.set_failing(true);

    let response = app
        .oneshot(put_json("/cache", r#"{"key":"k","value":"v"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["kind"], "remote");
}
