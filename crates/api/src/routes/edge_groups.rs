//! Edge group handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use domain::models::{EdgeGroup, EdgeGroupId, EdgeGroupRequest, EndpointId};
use domain::services::ReconcileReport;
use serde::Serialize;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEdgeGroupResponse {
    pub edge_group: EdgeGroup,
    pub reconciliation: ReconcileReport,
}

/// GET /api/v1/edge-groups
pub async fn list_edge_groups(
    State(state): State<AppState>,
) -> Result<Json<Vec<EdgeGroup>>, ApiError> {
    Ok(Json(state.service.list_edge_groups().await?))
}

/// GET /api/v1/edge-groups/:id
pub async fn get_edge_group(
    State(state): State<AppState>,
    Path(id): Path<EdgeGroupId>,
) -> Result<Json<EdgeGroup>, ApiError> {
    Ok(Json(state.service.get_edge_group(id).await?))
}

/// POST /api/v1/edge-groups
pub async fn create_edge_group(
    State(state): State<AppState>,
    payload: Result<Json<EdgeGroupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EdgeGroup>), ApiError> {
    let Json(request) = payload?;
    let group = state.service.create_edge_group(request).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// PUT /api/v1/edge-groups/:id
pub async fn update_edge_group(
    State(state): State<AppState>,
    Path(id): Path<EdgeGroupId>,
    payload: Result<Json<EdgeGroupRequest>, JsonRejection>,
) -> Result<Json<UpdateEdgeGroupResponse>, ApiError> {
    let Json(request) = payload?;
    let (edge_group, reconciliation) = state.service.update_edge_group(id, request).await?;
    Ok(Json(UpdateEdgeGroupResponse {
        edge_group,
        reconciliation,
    }))
}

/// DELETE /api/v1/edge-groups/:id
pub async fn delete_edge_group(
    State(state): State<AppState>,
    Path(id): Path<EdgeGroupId>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_edge_group(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/edge-groups/:id/endpoints
pub async fn group_endpoints(
    State(state): State<AppState>,
    Path(id): Path<EdgeGroupId>,
) -> Result<Json<Vec<EndpointId>>, ApiError> {
    Ok(Json(state.service.resolve_group_members(id).await?))
}
