//! Workspaces agent config handlers

use axum::{
    extract::{Path, State},
    Json,
};

use super::extract::ApiJson;
use crate::domain::agent_config::{AgentConfigParams, WorkspacesAgentConfig};
use crate::{AppState, Result};

/// Append a new config version for the agent
pub async fn update_agent_config(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    ApiJson(params): ApiJson<AgentConfigParams>,
) -> Result<Json<WorkspacesAgentConfig>> {
    let config = state.agent_config_service.update(&agent_id, params).await?;
    Ok(Json(config))
}

/// Get the latest config version of the agent
pub async fn get_agent_config(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<WorkspacesAgentConfig>> {
    let config = state.agent_config_service.latest(&agent_id).await?;
    Ok(Json(config))
}
