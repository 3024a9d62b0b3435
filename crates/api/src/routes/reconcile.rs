//! On-demand reconciliation.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use domain::services::{ReconcileReport, ReconcileTrigger};

use crate::app::AppState;
use crate::error::ApiError;

/// POST /api/v1/reconcile
///
/// Body is a trigger, e.g. `{"type": "edge_group_edit", "edge_group_id": 3}`
/// or `{"type": "all"}`.
pub async fn reconcile(
    State(state): State<AppState>,
    payload: Result<Json<ReconcileTrigger>, JsonRejection>,
) -> Result<Json<ReconcileReport>, ApiError> {
    let Json(trigger) = payload?;
    Ok(Json(state.service.reconcile(trigger).await?))
}
