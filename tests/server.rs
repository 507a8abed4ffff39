//! Router tests driven in-process with `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use narrative_chunker::config::Config;
use narrative_chunker::server::{build_router, AppState};
use narrative_chunker_core::provenance::memory::InMemoryProvenanceStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn router(provider: &str) -> Router {
    let mut config = Config::minimal();
    config.chunking.safe_token_budget = 15;
    config.processing.batch_delay_ms = 0;
    config.llm.provider = provider.to_string();
    let state = AppState::from_config(config, Arc::new(InMemoryProvenanceStore::new())).unwrap();
    build_router(state)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
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

const TEXT: &str = "Section 0 text.\n\nSection 1 text.\n\nSection 2 text.";

#[tokio::test]
async fn test_health() {
    let (status, body) = send(router("disabled"), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_split_returns_chunks() {
    let (status, body) = send(
        router("disabled"),
        post_json("/split", json!({ "text": TEXT, "run_id": "doc" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_id"], "doc");
    let chunks = body["chunks"].as_array().unwrap();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[1]["id"], "doc:0001");
}

#[tokio::test]
async fn test_split_zero_budget_is_bad_request() {
    let (status, body) = send(
        router("disabled"),
        post_json("/split", json!({ "text": TEXT, "budget": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let request = Request::builder()
        .method("POST")
        .uri("/split")
        .header("content-type", "application/json")
        .body(Body::from("{\"text\": "))
        .unwrap();
    let (status, body) = send(router("disabled"), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_transform_without_llm_is_rejected() {
    let (status, body) = send(
        router("disabled"),
        post_json("/transform", json!({ "text": TEXT })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "llm_disabled");
}

#[tokio::test]
async fn test_transform_with_echo() {
    let (status, body) = send(
        router("echo"),
        post_json("/transform", json!({ "text": TEXT, "style": "plain" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["chunk_count"], 3);
    assert_eq!(body["result"]["success_rate"], 1.0);
    assert_eq!(body["result"]["final_text"], TEXT);
}

#[tokio::test]
async fn test_summarize_then_lineage() {
    let app = router("echo");

    let (status, body) = send(
        app.clone(),
        post_json("/summarize", json!({ "text": TEXT, "run_id": "doc" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunk_count"], 3);
    assert_eq!(body["records_written"], 4);
    assert_eq!(body["top"][0]["chunk_id"], "doc:L1:0000");

    let (status, body) = send(app.clone(), get("/lineage/doc:0002")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["node"]["record"]["level"], 0);
    assert_eq!(body["children"][0]["chunk_id"], "doc:L1:0000");

    let (status, body) = send(app, get("/lineage/doc:L1:0000")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ancestors"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_lineage_unknown_is_not_found() {
    let (status, body) = send(router("disabled"), get("/lineage/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_recombine_rejects_inconsistent_results() {
    let results = json!({
        "results": [
            { "chunk_id": "r:0000", "index": 0, "success": true,
              "output": null, "original_content": "Alpha." }
        ]
    });
    let (status, body) = send(router("disabled"), post_json("/recombine", results)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_summarize_reused_run_id_is_bad_request() {
    let app = router("echo");
    let request = || post_json("/summarize", json!({ "text": TEXT, "run_id": "doc" }));

    let (status, _) = send(app.clone(), request()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app, request()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"].as_str().unwrap().contains("doc:0000"));
}
