//! Integration tests for the store-and-forward command log.

mod common;

use axum::http::{Method, StatusCode};
use common::{
    create_config, create_static_group, json_request, operations, pending_commands,
    register_edge_endpoint, send, test_app,
};
use domain::models::{CommandOperation, EndpointId};
use serde_json::json;

/// An async endpoint with one config, edited twice: add, replace, replace.
async fn endpoint_with_three_edits(app: &axum::Router) -> (i64, i64) {
    let endpoint = register_edge_endpoint(app, &[], true).await;
    let group = create_static_group(app, &[endpoint]).await;
    let created = create_config(app, &[group], json!({ "rev": "1" })).await;
    let config_id = created["resource"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/edge-resources/config/{}", config_id);
    for rev in ["2", "3"] {
        let (status, _) = send(
            app,
            json_request(
                Method::PATCH,
                &uri,
                json!({ "payload": { "kind": "config", "entries": { "rev": rev } } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    (endpoint, config_id)
}

#[tokio::test]
async fn test_pending_commands_in_append_order() {
    let (app, _) = test_app();
    let (endpoint, config_id) = endpoint_with_three_edits(&app).await;

    let commands = pending_commands(&app, endpoint, "").await;

    let path = format!("/edgeconfig/{}", config_id);
    assert_eq!(
        operations(&commands),
        vec![
            ("add".to_string(), path.clone()),
            ("replace".to_string(), path.clone()),
            ("replace".to_string(), path),
        ]
    );
    let ids: Vec<i64> = commands.iter().map(|c| c["id"].as_i64().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert!(commands.iter().all(|c| c["endpointId"] == endpoint));
}

#[tokio::test]
async fn test_collapse_keeps_only_latest_edit() {
    let (app, _) = test_app();
    let (endpoint, _) = endpoint_with_three_edits(&app).await;

    let collapsed = pending_commands(&app, endpoint, "?collapse=true").await;

    assert_eq!(collapsed.len(), 1);
    assert_eq!(collapsed[0]["version"], 3);
    assert_eq!(collapsed[0]["value"]["entries"]["rev"], "3");
}

#[tokio::test]
async fn test_after_cursor_skips_seen_entries() {
    let (app, _) = test_app();
    let (endpoint, _) = endpoint_with_three_edits(&app).await;
    let all = pending_commands(&app, endpoint, "").await;
    let first = all[0]["id"].as_i64().unwrap();

    let rest = pending_commands(&app, endpoint, &format!("?after={}", first)).await;

    assert_eq!(rest.len(), 2);
    assert_eq!(rest[0]["id"], all[1]["id"]);
}

#[tokio::test]
async fn test_acknowledge_removes_consumed_entries() {
    let (app, _) = test_app();
    let (endpoint, _) = endpoint_with_three_edits(&app).await;
    let all = pending_commands(&app, endpoint, "").await;
    let second = all[1]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/api/v1/endpoints/{}/commands/ack", endpoint),
            json!({ "upTo": second }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 2);
    let remaining = pending_commands(&app, endpoint, "").await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["id"], all[2]["id"]);
}

#[tokio::test]
async fn test_add_after_pending_entry_becomes_replace() {
    let (app, _) = test_app();
    let (endpoint, config_id) = endpoint_with_three_edits(&app).await;

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/api/v1/endpoints/{}/commands", endpoint),
            json!({ "resourceType": "config", "resourceId": config_id, "operation": "add" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["queued"].is_i64());
    let commands = pending_commands(&app, endpoint, "").await;
    let last = commands.last().unwrap();
    assert_eq!(last["operation"], "replace");
    assert_eq!(last["value"]["entries"]["rev"], "3");
}

#[tokio::test]
async fn test_enqueue_explicit_value() {
    let (app, _) = test_app();
    let endpoint = register_edge_endpoint(&app, &[], true).await;

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/api/v1/endpoints/{}/commands", endpoint),
            json!({
                "resourceType": "job",
                "resourceId": 9,
                "operation": "remove",
                "value": { "id": 9 },
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let commands = pending_commands(&app, endpoint, "").await;
    assert_eq!(commands[0]["id"], body["queued"]);
    assert_eq!(commands[0]["path"], "/edgejob/9");
    assert_eq!(commands[0]["version"], 0);
}

#[tokio::test]
async fn test_enqueue_without_value_for_unknown_resource_not_found() {
    let (app, _) = test_app();
    let endpoint = register_edge_endpoint(&app, &[], true).await;

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/api/v1/endpoints/{}/commands", endpoint),
            json!({ "resourceType": "stack", "resourceId": 3, "operation": "add" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_live_endpoint_receives_over_tunnel() {
    let (app, state) = test_app();
    let endpoint = register_edge_endpoint(&app, &[], false).await;
    let mut handle = state.tunnels.connect(EndpointId(endpoint)).await;
    let group = create_static_group(&app, &[endpoint]).await;

    let created = create_config(&app, &[group], json!({ "k": "v" })).await;

    let envelope = handle.receiver.try_recv().unwrap();
    assert_eq!(envelope.operation, CommandOperation::Add);
    assert_eq!(
        envelope.path,
        format!("/edgeconfig/{}", created["resource"]["id"])
    );
    assert!(pending_commands(&app, endpoint, "").await.is_empty());
}

#[tokio::test]
async fn test_live_endpoint_without_tunnel_is_unreachable() {
    let (app, _) = test_app();
    let endpoint = register_edge_endpoint(&app, &[], false).await;

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/api/v1/endpoints/{}/commands", endpoint),
            json!({ "resourceType": "config", "resourceId": 1, "operation": "remove" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("unreachable"));
}

#[tokio::test]
async fn test_reconcile_all_is_idempotent() {
    let (app, _) = test_app();
    let (endpoint, _) = endpoint_with_three_edits(&app).await;

    let (status, report) = send(
        &app,
        json_request(Method::POST, "/api/v1/reconcile", json!({ "type": "all" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["deltas"], json!([]));
    assert_eq!(pending_commands(&app, endpoint, "").await.len(), 3);
}

#[tokio::test]
async fn test_reconcile_rejects_unknown_trigger() {
    let (app, _) = test_app();

    let (status, _) = send(
        &app,
        json_request(Method::POST, "/api/v1/reconcile", json!({ "type": "everything" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
