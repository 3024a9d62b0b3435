//! Edge stack, job and config handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use domain::models::{
    CreateResourceRequest, EdgeResource, ResourceId, ResourceKind, ResourceRef,
    UpdateResourceRequest,
};
use domain::services::ReconcileReport;
use serde::Serialize;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceResponse {
    pub resource: EdgeResource,
    pub reconciliation: ReconcileReport,
}

/// GET /api/v1/edge-resources
pub async fn list_resources(
    State(state): State<AppState>,
) -> Result<Json<Vec<EdgeResource>>, ApiError> {
    Ok(Json(state.service.list_resources().await?))
}

/// GET /api/v1/edge-resources/:kind/:id
pub async fn get_resource(
    State(state): State<AppState>,
    Path((kind, id)): Path<(ResourceKind, ResourceId)>,
) -> Result<Json<EdgeResource>, ApiError> {
    let reference = ResourceRef::new(kind, id);
    Ok(Json(state.service.get_resource(reference).await?))
}

/// POST /api/v1/edge-resources
pub async fn create_resource(
    State(state): State<AppState>,
    payload: Result<Json<CreateResourceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ResourceResponse>), ApiError> {
    let Json(request) = payload?;
    let (resource, reconciliation) = state.service.create_resource(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ResourceResponse {
            resource,
            reconciliation,
        }),
    ))
}

/// PATCH /api/v1/edge-resources/:kind/:id
pub async fn update_resource(
    State(state): State<AppState>,
    Path((kind, id)): Path<(ResourceKind, ResourceId)>,
    payload: Result<Json<UpdateResourceRequest>, JsonRejection>,
) -> Result<Json<ResourceResponse>, ApiError> {
    let Json(request) = payload?;
    let reference = ResourceRef::new(kind, id);
    let (resource, reconciliation) = state.service.update_resource(reference, request).await?;
    Ok(Json(ResourceResponse {
        resource,
        reconciliation,
    }))
}

/// DELETE /api/v1/edge-resources/:kind/:id
///
/// Returns the Remove commands emitted to the devices that held the resource.
pub async fn delete_resource(
    State(state): State<AppState>,
    Path((kind, id)): Path<(ResourceKind, ResourceId)>,
) -> Result<Json<ReconcileReport>, ApiError> {
    let reference = ResourceRef::new(kind, id);
    Ok(Json(state.service.delete_resource(reference).await?))
}
