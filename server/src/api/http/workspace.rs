//! Workspace HTTP handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::extract::ApiJson;
use crate::domain::workspace::{ActualState, CreateWorkspaceParams, DesiredState, Workspace};
use crate::{AppState, Result};

// ==================== Request/Response Types ====================

/// Create workspace request
#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub user_id: String,
    pub devfile: String,
    pub desired_state: Option<DesiredState>,
}

/// Desired state update request
#[derive(Debug, Deserialize)]
pub struct UpdateDesiredStateRequest {
    pub desired_state: DesiredState,
}

/// Workspace response
#[derive(Debug, Serialize)]
pub struct WorkspaceResponse {
    pub id: String,
    pub agent_id: String,
    pub user_id: String,
    pub name: String,
    pub namespace: String,
    pub desired_state: DesiredState,
    pub actual_state: ActualState,
    pub desired_state_updated_at: String,
    pub responded_to_agent_at: Option<String>,
    pub deployment_resource_version: Option<String>,
    pub desired_config_generator_version: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Workspace> for WorkspaceResponse {
    fn from(workspace: Workspace) -> Self {
        Self {
            id: workspace.id,
            agent_id: workspace.agent_id,
            user_id: workspace.user_id,
            name: workspace.name,
            namespace: workspace.namespace,
            desired_state: workspace.desired_state,
            actual_state: workspace.actual_state,
            desired_state_updated_at: workspace.desired_state_updated_at.to_rfc3339(),
            responded_to_agent_at: workspace.responded_to_agent_at.map(|at| at.to_rfc3339()),
            deployment_resource_version: workspace.deployment_resource_version,
            desired_config_generator_version: workspace.desired_config_generator_version,
            created_at: workspace.created_at.to_rfc3339(),
            updated_at: workspace.updated_at.to_rfc3339(),
        }
    }
}

// ==================== Handlers ====================

/// Create a new workspace for an agent
pub async fn create_workspace(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    ApiJson(req): ApiJson<CreateWorkspaceRequest>,
) -> Result<Json<WorkspaceResponse>> {
    let params = CreateWorkspaceParams {
        agent_id,
        user_id: req.user_id,
        devfile: req.devfile,
        desired_state: req.desired_state,
    };

    let workspace = state.workspace_service.create(params).await?;
    Ok(Json(workspace.into()))
}

/// Get a workspace by ID
pub async fn get_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkspaceResponse>> {
    let workspace = state.workspace_service.get(&id).await?;
    Ok(Json(workspace.into()))
}

/// Change the desired state of a workspace
pub async fn update_desired_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateDesiredStateRequest>,
) -> Result<Json<WorkspaceResponse>> {
    let workspace = state
        .workspace_service
        .update_desired_state(&id, req.desired_state)
        .await?;
    Ok(Json(workspace.into()))
}
