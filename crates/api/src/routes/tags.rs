//! Tag endpoint handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use domain::models::{CreateTagRequest, Tag, TagId};
use domain::services::ReconcileReport;

use crate::app::AppState;
use crate::error::ApiError;

/// GET /api/v1/tags
pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<Tag>>, ApiError> {
    Ok(Json(state.service.list_tags().await?))
}

/// POST /api/v1/tags
pub async fn create_tag(
    State(state): State<AppState>,
    payload: Result<Json<CreateTagRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    let Json(request) = payload?;
    let tag = state.service.create_tag(request).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

/// DELETE /api/v1/tags/:id
///
/// Strips the tag from every holder and returns the resulting reconciliation.
pub async fn delete_tag(
    State(state): State<AppState>,
    Path(id): Path<TagId>,
) -> Result<Json<ReconcileReport>, ApiError> {
    Ok(Json(state.service.delete_tag(id).await?))
}
