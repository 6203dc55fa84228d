//! Agent reconciliation handler

use axum::{
    extract::{Path, State},
    Json,
};

use super::extract::ApiJson;
use crate::domain::reconcile::{ReconcileParams, ReconcileResponse};
use crate::AppState;

/// Reconcile the workspaces of one agent.
///
/// Per-workspace failures never turn into an error status; the agent always
/// gets its settings back.
pub async fn reconcile(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    ApiJson(params): ApiJson<ReconcileParams>,
) -> Json<ReconcileResponse> {
    let outcome = state
        .reconcile_service
        .reconcile(&agent_id, params, state.config.reconcile_settings())
        .await;

    Json(outcome.response)
}
