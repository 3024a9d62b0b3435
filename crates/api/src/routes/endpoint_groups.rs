//! Static endpoint group handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use domain::models::{
    CreateEndpointGroupRequest, EndpointGroup, EndpointGroupId, UpdateEndpointGroupTagsRequest,
};
use domain::services::ReconcileReport;

use crate::app::AppState;
use crate::error::ApiError;

/// GET /api/v1/endpoint-groups
pub async fn list_endpoint_groups(
    State(state): State<AppState>,
) -> Result<Json<Vec<EndpointGroup>>, ApiError> {
    Ok(Json(state.service.list_endpoint_groups().await?))
}

/// GET /api/v1/endpoint-groups/:id
pub async fn get_endpoint_group(
    State(state): State<AppState>,
    Path(id): Path<EndpointGroupId>,
) -> Result<Json<EndpointGroup>, ApiError> {
    Ok(Json(state.service.get_endpoint_group(id).await?))
}

/// POST /api/v1/endpoint-groups
pub async fn create_endpoint_group(
    State(state): State<AppState>,
    payload: Result<Json<CreateEndpointGroupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EndpointGroup>), ApiError> {
    let Json(request) = payload?;
    let group = state.service.create_endpoint_group(request).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// PUT /api/v1/endpoint-groups/:id/tags
pub async fn update_endpoint_group_tags(
    State(state): State<AppState>,
    Path(id): Path<EndpointGroupId>,
    payload: Result<Json<UpdateEndpointGroupTagsRequest>, JsonRejection>,
) -> Result<Json<ReconcileReport>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(
        state.service.update_endpoint_group_tags(id, request).await?,
    ))
}

/// DELETE /api/v1/endpoint-groups/:id
pub async fn delete_endpoint_group(
    State(state): State<AppState>,
    Path(id): Path<EndpointGroupId>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_endpoint_group(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
