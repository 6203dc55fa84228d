//! Classification and logging of per-workspace reconciliation problems

use tracing::{error, warn};

use crate::domain::reconcile::{ErrorDetails, WorkspaceAgentInfo};
use crate::domain::workspace::{ActualState, DesiredState};

use super::transition::Anomaly;

/// Something that went wrong for one workspace during a pass.
///
/// None of these abort the batch; `error_type` is the structured log field
/// operators filter on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileIssue {
    /// Agent reported a workspace that has no record
    OrphanedWorkspace {
        name: String,
        namespace: String,
        actual_state: ActualState,
    },
    /// Agent reported the same workspace more than once in one request
    DuplicateAgentInfo { name: String, namespace: String },
    /// Reported state does not fit the desired state, or carries an error
    AbnormalActualState {
        name: String,
        namespace: String,
        desired_state: DesiredState,
        reported_state: ActualState,
        error_details: Option<ErrorDetails>,
    },
    /// Pinned agent config could not be loaded
    AgentConfigUnavailable {
        name: String,
        namespace: String,
        version: Option<i64>,
    },
    ConfigGenerationFailed {
        name: String,
        namespace: String,
        reason: String,
    },
    LookupFailed {
        name: String,
        namespace: String,
        reason: String,
    },
    PersistFailed {
        name: String,
        namespace: String,
        reason: String,
    },
    ProcessingPanicked { name: String, namespace: String },
}

impl ReconcileIssue {
    pub fn orphaned(info: &WorkspaceAgentInfo) -> Self {
        ReconcileIssue::OrphanedWorkspace {
            name: info.name.clone(),
            namespace: info.namespace.clone(),
            actual_state: info.current_actual_state,
        }
    }

    pub fn abnormal(
        info: &WorkspaceAgentInfo,
        desired_state: DesiredState,
        anomaly: &Anomaly,
    ) -> Self {
        let error_details = match anomaly {
            Anomaly::AgentError(details) => Some(details.clone()),
            Anomaly::UnexpectedState(_) => None,
        };

        ReconcileIssue::AbnormalActualState {
            name: info.name.clone(),
            namespace: info.namespace.clone(),
            desired_state,
            reported_state: info.current_actual_state,
            error_details,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ReconcileIssue::OrphanedWorkspace { .. } => "orphaned_workspace",
            ReconcileIssue::DuplicateAgentInfo { .. } => "duplicate_workspace_agent_info",
            ReconcileIssue::AbnormalActualState { .. } => "abnormal_actual_state",
            ReconcileIssue::AgentConfigUnavailable { .. } => "agent_config_unavailable",
            ReconcileIssue::ConfigGenerationFailed { .. } => "config_generation_failed",
            ReconcileIssue::LookupFailed { .. } => "workspace_lookup_failed",
            ReconcileIssue::PersistFailed { .. } => "workspace_persist_failed",
            ReconcileIssue::ProcessingPanicked { .. } => "workspace_processing_panicked",
        }
    }

    /// Workspace name and namespace the issue is about
    pub fn workspace(&self) -> (&str, &str) {
        match self {
            ReconcileIssue::OrphanedWorkspace {
                name, namespace, ..
            }
            | ReconcileIssue::DuplicateAgentInfo { name, namespace }
            | ReconcileIssue::AbnormalActualState {
                name, namespace, ..
            }
            | ReconcileIssue::AgentConfigUnavailable {
                name, namespace, ..
            }
            | ReconcileIssue::ConfigGenerationFailed {
                name, namespace, ..
            }
            | ReconcileIssue::LookupFailed {
                name, namespace, ..
            }
            | ReconcileIssue::PersistFailed {
                name, namespace, ..
            }
            | ReconcileIssue::ProcessingPanicked { name, namespace } => (name, namespace),
        }
    }

    /// Emit the issue on the structured log
    pub fn log(&self, agent_id: &str) {
        let error_type = self.error_type();
        let (workspace, namespace) = self.workspace();

        match self {
            ReconcileIssue::OrphanedWorkspace { actual_state, .. } => {
                warn!(
                    error_type,
                    agent_id,
                    workspace,
                    namespace,
                    actual_state = actual_state.as_str(),
                    "Received workspace agent info for unknown workspace"
                );
            }
            ReconcileIssue::DuplicateAgentInfo { .. } => {
                warn!(
                    error_type,
                    agent_id, workspace, namespace, "Ignoring duplicate workspace agent info"
                );
            }
            ReconcileIssue::AbnormalActualState {
                desired_state,
                reported_state,
                error_details,
                ..
            } => {
                warn!(
                    error_type,
                    agent_id,
                    workspace,
                    namespace,
                    desired_state = desired_state.as_str(),
                    actual_state = reported_state.as_str(),
                    agent_error_type = error_details.as_ref().map(|d| d.error_type.as_str()),
                    agent_error_message = error_details
                        .as_ref()
                        .and_then(|d| d.error_message.as_deref()),
                    "Abnormal workspace actual state reported by agent"
                );
            }
            ReconcileIssue::AgentConfigUnavailable { version, .. } => {
                error!(
                    error_type,
                    agent_id,
                    workspace,
                    namespace,
                    version = ?version,
                    "Workspaces agent config unavailable, withholding config"
                );
            }
            ReconcileIssue::ConfigGenerationFailed { reason, .. }
            | ReconcileIssue::LookupFailed { reason, .. }
            | ReconcileIssue::PersistFailed { reason, .. } => {
                error!(
                    error_type,
                    agent_id,
                    workspace,
                    namespace,
                    reason = reason.as_str(),
                    "Workspace reconciliation failed"
                );
            }
            ReconcileIssue::ProcessingPanicked { .. } => {
                error!(
                    error_type,
                    agent_id, workspace, namespace, "Workspace reconciliation panicked"
                );
            }
        }
    }
}
