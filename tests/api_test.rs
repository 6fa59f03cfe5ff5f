//! Integration tests for the health and configuration endpoints.

mod common;

use axum::body::Body;
use axum::http::Request;
use common::TestHarness;
use nzbdav::config::manager::{API_CATEGORIES, USENET_CONNECTIONS_PER_STREAM, USENET_PASS};
use nzbdav_nntp::mock::MemoryClient;

async fn put_config(h: &TestHarness, json: serde_json::Value) -> u16 {
    let request = Request::builder()
        .method("PUT")
        .uri("/api/config")
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    h.send(request).await.0.as_u16()
}

#[tokio::test]
async fn health_endpoint() {
    let h = TestHarness::new(MemoryClient::new());
    let (status, _, _) = h.get("/health", None).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn config_update_is_visible_and_masks_password() {
    let h = TestHarness::new(MemoryClient::new());

    let status = put_config(
        &h,
        serde_json::json!({
            API_CATEGORIES: "tv,anime",
            USENET_PASS: "hunter2",
        }),
    )
    .await;
    assert_eq!(status, 204);

    let (status, _, body) = h.get("/api/config", None).await;
    assert_eq!(status, 200);
    let values: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(values[API_CATEGORIES], "tv,anime");
    assert_eq!(values[USENET_PASS], "********");
    assert_eq!(h.ctx.config.categories(), ["tv", "anime"]);
}

#[tokio::test]
async fn config_update_rejects_invalid_values() {
    let h = TestHarness::new(MemoryClient::new());
    let status = put_config(
        &h,
        serde_json::json!({ USENET_CONNECTIONS_PER_STREAM: "zero" }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(h.ctx.config.connections_per_stream(), 1);
}

#[tokio::test]
async fn history_starts_empty() {
    let h = TestHarness::new(MemoryClient::new());
    let (status, _, body) = h.get("/api/history?limit=5", None).await;
    assert_eq!(status, 200);
    let records: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(records, serde_json::json!([]));
}
