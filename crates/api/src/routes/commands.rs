//! Command log handlers used by store-and-forward agents.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use domain::models::{
    AcknowledgeCommandsRequest, CommandId, EdgeAsyncCommand, EndpointId, EnqueueCommandRequest,
};
use domain::services::DispatchOutcome;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct PendingCommandsQuery {
    pub after: Option<CommandId>,
    pub collapse: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeResponse {
    pub removed: u64,
}

/// POST /api/v1/endpoints/:id/commands
///
/// Builds the envelope from the stored resource when no value is supplied.
pub async fn enqueue_command(
    State(state): State<AppState>,
    Path(id): Path<EndpointId>,
    payload: Result<Json<EnqueueCommandRequest>, JsonRejection>,
) -> Result<Json<DispatchOutcome>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.service.enqueue_command(id, request).await?))
}

/// GET /api/v1/endpoints/:id/commands?after=&collapse=
pub async fn pending_commands(
    State(state): State<AppState>,
    Path(id): Path<EndpointId>,
    Query(query): Query<PendingCommandsQuery>,
) -> Result<Json<Vec<EdgeAsyncCommand>>, ApiError> {
    let entries = state
        .service
        .pending_commands(id, query.after, query.collapse)
        .await?;
    Ok(Json(entries))
}

/// POST /api/v1/endpoints/:id/commands/ack
pub async fn acknowledge_commands(
    State(state): State<AppState>,
    Path(id): Path<EndpointId>,
    payload: Result<Json<AcknowledgeCommandsRequest>, JsonRejection>,
) -> Result<Json<AcknowledgeResponse>, ApiError> {
    let Json(request) = payload?;
    let removed = state.service.acknowledge_commands(id, request.up_to).await?;
    Ok(Json(AcknowledgeResponse { removed }))
}
