//! Shared fixtures for the HTTP integration tests.
//!
//! Every test builds its own router over a fresh in-memory store, so tests
//! are independent and need no database.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use domain::store::{InMemoryContentStore, InMemoryStore};
use edge_fleet_api::{
    app::{create_app, AppState},
    config::Config,
};
use fake::{faker::lorem::en::Word, Fake};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

pub fn test_config() -> Config {
    Config::load_for_test(&[]).expect("Failed to load test config")
}

/// Router and state over an in-memory store and in-memory content.
pub fn test_app() -> (Router, AppState) {
    let state = AppState::with_store(
        test_config(),
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryContentStore::new()),
        None,
    );
    (create_app(state.clone()), state)
}

/// Router whose content store reads from `content_root` on disk.
pub fn test_app_with_content_root(content_root: &Path) -> (Router, AppState) {
    let root = content_root.to_string_lossy().to_string();
    let config = Config::load_for_test(&[("edge.content_root", root.as_str())])
        .expect("Failed to load test config");
    let state = AppState::new(config, None);
    (create_app(state.clone()), state)
}

/// A name the name validator accepts.
pub fn unique_name(prefix: &str) -> String {
    let word: String = Word().fake();
    let suffix: u32 = (1000..9999).fake();
    format!("{}-{}-{}", prefix, word, suffix)
}

pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn delete_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn parse_response_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

/// Sends `request` and returns the status with the parsed JSON body.
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, parse_response_body(response).await)
}

// ============================================================================
// Fixtures
// ============================================================================

pub async fn create_tag(app: &Router, name: &str) -> i64 {
    let (status, body) = send(
        app,
        json_request(Method::POST, "/api/v1/tags", json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create tag: {}", body);
    body["id"].as_i64().unwrap()
}

/// Registers a trusted Docker edge agent.
pub async fn register_edge_endpoint(app: &Router, tag_ids: &[i64], async_mode: bool) -> i64 {
    register_endpoint(
        app,
        json!({
            "name": unique_name("edge"),
            "kind": "edge_agent_docker",
            "tagIds": tag_ids,
            "userTrusted": true,
            "asyncMode": async_mode,
            "edgeId": unique_name("agent"),
        }),
    )
    .await
}

pub async fn register_endpoint(app: &Router, body: Value) -> i64 {
    let (status, body) = send(app, json_request(Method::POST, "/api/v1/endpoints", body)).await;
    assert_eq!(status, StatusCode::CREATED, "register endpoint: {}", body);
    body["id"].as_i64().unwrap()
}

pub async fn create_dynamic_group(app: &Router, tag_ids: &[i64], partial: bool) -> i64 {
    let match_mode = if partial { "partial" } else { "full" };
    create_edge_group(
        app,
        json!({
            "name": unique_name("dynamic"),
            "selector": { "type": "dynamic", "tags": tag_ids, "match_mode": match_mode },
        }),
    )
    .await
}

pub async fn create_static_group(app: &Router, endpoint_ids: &[i64]) -> i64 {
    create_edge_group(
        app,
        json!({
            "name": unique_name("static"),
            "selector": { "type": "static", "endpoints": endpoint_ids },
        }),
    )
    .await
}

async fn create_edge_group(app: &Router, body: Value) -> i64 {
    let (status, body) = send(app, json_request(Method::POST, "/api/v1/edge-groups", body)).await;
    assert_eq!(status, StatusCode::CREATED, "create edge group: {}", body);
    body["id"].as_i64().unwrap()
}

/// Creates an edge config and returns `{resource, reconciliation}`.
pub async fn create_config(app: &Router, edge_groups: &[i64], entries: Value) -> Value {
    let (status, body) = send(
        app,
        json_request(
            Method::POST,
            "/api/v1/edge-resources",
            json!({
                "name": unique_name("config"),
                "edgeGroups": edge_groups,
                "payload": { "kind": "config", "entries": entries },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create config: {}", body);
    body
}

pub async fn pending_commands(app: &Router, endpoint_id: i64, query: &str) -> Vec<Value> {
    let (status, body) = send(
        app,
        get_request(&format!("/api/v1/endpoints/{}/commands{}", endpoint_id, query)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "pending commands: {}", body);
    body.as_array().cloned().unwrap_or_default()
}

/// The `(operation, path)` pairs of a command list.
pub fn operations(commands: &[Value]) -> Vec<(String, String)> {
    commands
        .iter()
        .map(|c| {
            (
                c["operation"].as_str().unwrap().to_string(),
                c["path"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

/// The delta of `endpoint_id` in a reconciliation report, if any.
pub fn delta_for(report: &Value, endpoint_id: i64) -> Option<Value> {
    report["deltas"]
        .as_array()?
        .iter()
        .find(|d| d["endpointId"].as_i64() == Some(endpoint_id))
        .cloned()
}
