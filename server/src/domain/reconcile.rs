//! Agent reconciliation request and response types

use serde::{Deserialize, Serialize};

use crate::domain::agent_config::ImagePullSecret;
use crate::domain::workspace::{ActualState, DesiredState};

/// Kind of reconciliation pass requested by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    /// Covers every workspace of the agent, including ones it never reported
    Full,
    /// Limited to the workspaces the agent reports on
    Partial,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Full => "full",
            UpdateType::Partial => "partial",
        }
    }
}

/// Structured error the agent attaches to a workspace it failed to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub error_type: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Workspace snapshot reported by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceAgentInfo {
    pub name: String,

    pub namespace: String,

    #[serde(default)]
    pub previous_actual_state: Option<ActualState>,

    pub current_actual_state: ActualState,

    /// Whether the workspace deployment exists in the cluster
    #[serde(default)]
    pub workspace_exists: bool,

    /// Resource version of the workspace deployment
    #[serde(default)]
    pub resource_version: Option<String>,

    #[serde(default)]
    pub error_details: Option<ErrorDetails>,
}

impl WorkspaceAgentInfo {
    /// Identity used to match the info against stored workspaces
    pub fn key(&self) -> (&str, &str) {
        (&self.name, &self.namespace)
    }
}

/// Reconcile request parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileParams {
    pub update_type: UpdateType,

    #[serde(default)]
    pub workspace_agent_infos: Vec<WorkspaceAgentInfo>,
}

/// Polling intervals returned to the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub full_reconciliation_interval_seconds: u64,
    pub partial_reconciliation_interval_seconds: u64,
}

/// Per-workspace instruction returned to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceRailsInfo {
    pub name: String,
    pub namespace: String,
    pub desired_state: DesiredState,
    pub actual_state: ActualState,
    pub deployment_resource_version: Option<String>,
    /// Multi-document YAML manifest, absent when nothing must be applied
    pub config_to_apply: Option<String>,
    pub image_pull_secrets: Vec<ImagePullSecret>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilePayload {
    pub settings: Settings,
    pub workspace_rails_infos: Vec<WorkspaceRailsInfo>,
}

/// Reconcile response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub payload: ReconcilePayload,
    /// Set only when the whole batch could not be processed
    pub message: Option<String>,
}
