//! Integration tests for endpoint registration, liveness and relations.

mod common;

use axum::http::{Method, StatusCode};
use common::{
    create_config, create_dynamic_group, create_static_group, create_tag, delete_request,
    delta_for, get_request, json_request, pending_commands, post_empty, register_edge_endpoint,
    register_endpoint, send, test_app, unique_name,
};
use serde_json::json;

#[tokio::test]
async fn test_register_endpoint_defaults() {
    let (app, _) = test_app();
    let name = unique_name("edge");

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/endpoints",
            json!({ "name": name, "kind": "edge_agent_docker" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], name);
    assert_eq!(body["groupId"], 1);
    assert_eq!(body["userTrusted"], false);
    assert_eq!(body["asyncMode"], false);
    assert!(body["lastCheckinAt"].is_null());
}

#[tokio::test]
async fn test_register_endpoint_rejects_bad_interval() {
    let (app, _) = test_app();

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/endpoints",
            json!({ "name": unique_name("edge"), "kind": "edge_agent_docker", "checkinIntervalSecs": 0 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_registered_endpoint_joins_dynamic_group_and_receives_resources() {
    let (app, _) = test_app();
    let tag = create_tag(&app, &unique_name("fleet")).await;
    let group = create_dynamic_group(&app, &[tag], true).await;
    let created = create_config(&app, &[group], json!({ "level": "info" })).await;
    let config_id = created["resource"]["id"].as_i64().unwrap();

    let endpoint = register_edge_endpoint(&app, &[tag], true).await;

    let commands = pending_commands(&app, endpoint, "").await;
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0]["operation"], "add");
    assert_eq!(commands[0]["path"], format!("/edgeconfig/{}", config_id));
    assert_eq!(commands[0]["value"]["entries"]["level"], "info");

    let (_, groups) = send(
        &app,
        get_request(&format!("/api/v1/endpoints/{}/edge-groups", endpoint)),
    )
    .await;
    assert_eq!(groups[0]["id"], group);

    let (_, related) = send(
        &app,
        get_request(&format!("/api/v1/endpoints/{}/related-resources", endpoint)),
    )
    .await;
    assert_eq!(related[0]["id"], config_id);
}

#[tokio::test]
async fn test_untrusted_endpoint_is_not_targeted() {
    let (app, _) = test_app();
    let tag = create_tag(&app, &unique_name("fleet")).await;
    let group = create_dynamic_group(&app, &[tag], true).await;
    create_config(&app, &[group], json!({ "k": "v" })).await;

    let endpoint = register_endpoint(
        &app,
        json!({
            "name": unique_name("edge"),
            "kind": "edge_agent_docker",
            "tagIds": [tag],
            "asyncMode": true,
        }),
    )
    .await;

    assert!(pending_commands(&app, endpoint, "").await.is_empty());

    let (status, body) = send(
        &app,
        json_request(
            Method::PATCH,
            &format!("/api/v1/endpoints/{}", endpoint),
            json!({ "userTrusted": true }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userTrusted"], true);
    assert_eq!(pending_commands(&app, endpoint, "").await.len(), 1);
}

#[tokio::test]
async fn test_update_endpoint_tags_removes_resources() {
    let (app, _) = test_app();
    let tag = create_tag(&app, &unique_name("fleet")).await;
    let group = create_dynamic_group(&app, &[tag], true).await;
    let endpoint = register_edge_endpoint(&app, &[tag], true).await;
    create_config(&app, &[group], json!({ "k": "v" })).await;

    let (status, _) = send(
        &app,
        json_request(
            Method::PATCH,
            &format!("/api/v1/endpoints/{}", endpoint),
            json!({ "tagIds": [] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let commands = pending_commands(&app, endpoint, "").await;
    let ops: Vec<&str> = commands
        .iter()
        .map(|c| c["operation"].as_str().unwrap())
        .collect();
    assert_eq!(ops, vec!["add", "remove"]);
    assert_eq!(
        commands[1]["value"],
        json!({ "id": commands[0]["value"]["id"] })
    );
}

#[tokio::test]
async fn test_checkin_marks_endpoint_alive() {
    let (app, _) = test_app();
    let endpoint = register_edge_endpoint(&app, &[], false).await;

    let (_, status_body) = send(
        &app,
        get_request(&format!("/api/v1/endpoints/{}/status", endpoint)),
    )
    .await;
    assert_eq!(status_body["alive"], false);

    let (status, body) = send(
        &app,
        post_empty(&format!("/api/v1/endpoints/{}/checkin", endpoint)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpointId"], endpoint);
    assert_eq!(body["alive"], true);
    assert_eq!(body["tunnelConnected"], false);
    assert!(body["lastCheckinAt"].is_string());
}

#[tokio::test]
async fn test_status_reports_live_tunnel_and_pending_commands() {
    let (app, state) = test_app();
    let tag = create_tag(&app, &unique_name("fleet")).await;
    let group = create_dynamic_group(&app, &[tag], true).await;
    let endpoint = register_edge_endpoint(&app, &[tag], true).await;
    create_config(&app, &[group], json!({ "k": "v" })).await;
    let _handle = state
        .tunnels
        .connect(domain::models::EndpointId(endpoint))
        .await;

    let (_, body) = send(
        &app,
        get_request(&format!("/api/v1/endpoints/{}/status", endpoint)),
    )
    .await;

    assert_eq!(body["tunnelConnected"], true);
    assert_eq!(body["asyncMode"], true);
    assert_eq!(body["pendingCommands"], 1);
}

#[tokio::test]
async fn test_deassociate_clears_agent_identity_and_tunnel() {
    let (app, state) = test_app();
    let endpoint = register_edge_endpoint(&app, &[], false).await;
    let _handle = state
        .tunnels
        .connect(domain::models::EndpointId(endpoint))
        .await;

    let (status, body) = send(
        &app,
        post_empty(&format!("/api/v1/endpoints/{}/deassociate", endpoint)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["edgeId"].is_null());
    assert_eq!(state.tunnels.connected_count().await, 0);
}

#[tokio::test]
async fn test_delete_endpoint_drops_static_membership() {
    let (app, _) = test_app();
    let first = register_edge_endpoint(&app, &[], true).await;
    let second = register_edge_endpoint(&app, &[], true).await;
    let group = create_static_group(&app, &[first, second]).await;

    let (status, _) = send(&app, delete_request(&format!("/api/v1/endpoints/{}", first))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get_request(&format!("/api/v1/endpoints/{}", first))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, members) = send(
        &app,
        get_request(&format!("/api/v1/edge-groups/{}/endpoints", group)),
    )
    .await;
    assert_eq!(members, json!([second]));
}

#[tokio::test]
async fn test_unknown_endpoint_not_found() {
    let (app, _) = test_app();

    for uri in [
        "/api/v1/endpoints/77",
        "/api/v1/endpoints/77/status",
        "/api/v1/endpoints/77/edge-groups",
        "/api/v1/endpoints/77/related-resources",
        "/api/v1/endpoints/77/commands",
    ] {
        let (status, _) = send(&app, get_request(uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn test_reconcile_endpoint_is_idempotent() {
    let (app, _) = test_app();
    let tag = create_tag(&app, &unique_name("fleet")).await;
    let group = create_dynamic_group(&app, &[tag], true).await;
    let endpoint = register_edge_endpoint(&app, &[tag], true).await;
    create_config(&app, &[group], json!({ "k": "v" })).await;

    let (status, report) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/reconcile",
            json!({ "type": "endpoint_edit", "endpoint_id": endpoint }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(delta_for(&report, endpoint).is_none());
    assert_eq!(pending_commands(&app, endpoint, "").await.len(), 1);
}
