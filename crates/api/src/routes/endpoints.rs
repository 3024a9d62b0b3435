//! Endpoint handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use domain::models::{
    EdgeGroup, EdgeResource, Endpoint, EndpointId, EndpointStatus, RegisterEndpointRequest,
    UpdateEndpointRequest,
};
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;

/// GET /api/v1/endpoints
pub async fn list_endpoints(
    State(state): State<AppState>,
) -> Result<Json<Vec<Endpoint>>, ApiError> {
    Ok(Json(state.service.list_endpoints().await?))
}

/// GET /api/v1/endpoints/:id
pub async fn get_endpoint(
    State(state): State<AppState>,
    Path(id): Path<EndpointId>,
) -> Result<Json<Endpoint>, ApiError> {
    Ok(Json(state.service.get_endpoint(id).await?))
}

/// POST /api/v1/endpoints
pub async fn register_endpoint(
    State(state): State<AppState>,
    payload: Result<Json<RegisterEndpointRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Endpoint>), ApiError> {
    let Json(request) = payload?;
    let endpoint = state.service.register_endpoint(request).await?;
    info!(endpoint_id = %endpoint.id, kind = %endpoint.kind, "Endpoint registered");
    Ok((StatusCode::CREATED, Json(endpoint)))
}

/// PATCH /api/v1/endpoints/:id
pub async fn update_endpoint(
    State(state): State<AppState>,
    Path(id): Path<EndpointId>,
    payload: Result<Json<UpdateEndpointRequest>, JsonRejection>,
) -> Result<Json<Endpoint>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.service.update_endpoint(id, request).await?))
}

/// DELETE /api/v1/endpoints/:id
pub async fn delete_endpoint(
    State(state): State<AppState>,
    Path(id): Path<EndpointId>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_endpoint(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/endpoints/:id/checkin
pub async fn checkin(
    State(state): State<AppState>,
    Path(id): Path<EndpointId>,
) -> Result<Json<EndpointStatus>, ApiError> {
    let status = state.service.record_checkin(id, Utc::now()).await?;
    state.tunnels.touch(id).await;
    Ok(Json(status))
}

/// GET /api/v1/endpoints/:id/status
pub async fn endpoint_status(
    State(state): State<AppState>,
    Path(id): Path<EndpointId>,
) -> Result<Json<EndpointStatus>, ApiError> {
    Ok(Json(state.service.endpoint_status(id).await?))
}

/// POST /api/v1/endpoints/:id/deassociate
pub async fn deassociate_endpoint(
    State(state): State<AppState>,
    Path(id): Path<EndpointId>,
) -> Result<Json<Endpoint>, ApiError> {
    Ok(Json(state.service.deassociate_endpoint(id).await?))
}

/// GET /api/v1/endpoints/:id/edge-groups
pub async fn endpoint_edge_groups(
    State(state): State<AppState>,
    Path(id): Path<EndpointId>,
) -> Result<Json<Vec<EdgeGroup>>, ApiError> {
    Ok(Json(state.service.endpoint_edge_groups(id).await?))
}

/// GET /api/v1/endpoints/:id/related-resources
pub async fn related_resources(
    State(state): State<AppState>,
    Path(id): Path<EndpointId>,
) -> Result<Json<Vec<EdgeResource>>, ApiError> {
    Ok(Json(state.service.related_resources(id).await?))
}
