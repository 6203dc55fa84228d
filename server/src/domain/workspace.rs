//! Workspace domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State the control plane wants a workspace to reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    Running,
    Stopped,
    /// Terminal: never left once reached
    Terminated,
    /// Stop the workload, then bring it back up
    RestartRequested,
}

impl DesiredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredState::Running => "running",
            DesiredState::Stopped => "stopped",
            DesiredState::Terminated => "terminated",
            DesiredState::RestartRequested => "restart_requested",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(DesiredState::Running),
            "stopped" => Some(DesiredState::Stopped),
            "terminated" => Some(DesiredState::Terminated),
            "restart_requested" => Some(DesiredState::RestartRequested),
            _ => None,
        }
    }

    /// Whether the agent-observed state already satisfies this desired state
    pub fn is_reached_by(&self, actual: ActualState) -> bool {
        match self {
            DesiredState::Running => actual == ActualState::Running,
            DesiredState::Stopped => actual == ActualState::Stopped,
            DesiredState::Terminated => actual == ActualState::Terminated,
            DesiredState::RestartRequested => false,
        }
    }
}

/// State last observed and reported by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActualState {
    /// Created in the control plane, not yet materialized in the cluster
    CreationRequested,
    Starting,
    Running,
    Stopping,
    Stopped,
    Terminating,
    Terminated,
    Error,
    Unknown,
}

impl ActualState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActualState::CreationRequested => "creation_requested",
            ActualState::Starting => "starting",
            ActualState::Running => "running",
            ActualState::Stopping => "stopping",
            ActualState::Stopped => "stopped",
            ActualState::Terminating => "terminating",
            ActualState::Terminated => "terminated",
            ActualState::Error => "error",
            ActualState::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "creation_requested" => Some(ActualState::CreationRequested),
            "starting" => Some(ActualState::Starting),
            "running" => Some(ActualState::Running),
            "stopping" => Some(ActualState::Stopping),
            "stopped" => Some(ActualState::Stopped),
            "terminating" => Some(ActualState::Terminating),
            "terminated" => Some(ActualState::Terminated),
            "error" => Some(ActualState::Error),
            "unknown" => Some(ActualState::Unknown),
            _ => None,
        }
    }
}

/// Workspace entity
///
/// One remote development workspace served by a cluster agent. Rows are
/// mutated by the reconciliation engine and never physically deleted; a
/// workspace ends its life at `terminated`/`terminated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique identifier
    pub id: String,

    /// Agent serving this workspace
    pub agent_id: String,

    /// Owning user
    pub user_id: String,

    /// Kubernetes object name, unique per agent
    pub name: String,

    /// Kubernetes namespace the workspace lives in
    pub namespace: String,

    pub desired_state: DesiredState,

    pub actual_state: ActualState,

    pub desired_state_updated_at: DateTime<Utc>,

    /// Last time the workspace was returned to the agent
    pub responded_to_agent_at: Option<DateTime<Utc>>,

    /// Opaque deployment resource version reported by the agent
    pub deployment_resource_version: Option<String>,

    /// Devfile source (YAML)
    pub devfile: String,

    /// Agent config version the manifest is generated from
    pub desired_config_generator_version: Option<i64>,

    /// Optimistic concurrency token, bumped on every engine write
    pub lock_version: i64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    /// The desired state was changed after the agent last heard about it
    pub fn desired_state_changed_since_response(&self) -> bool {
        match self.responded_to_agent_at {
            Some(responded) => self.desired_state_updated_at > responded,
            None => true,
        }
    }
}

/// Parameters for creating a workspace
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkspaceParams {
    /// Agent serving the workspace
    pub agent_id: String,

    /// Owning user
    pub user_id: String,

    /// Devfile source (YAML)
    pub devfile: String,

    /// Initial desired state, `running` when omitted
    pub desired_state: Option<DesiredState>,
}

/// Fields written by one reconciliation pass, in a single update
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledWorkspace {
    pub desired_state: DesiredState,
    pub desired_state_updated_at: DateTime<Utc>,
    pub actual_state: ActualState,
    pub responded_to_agent_at: DateTime<Utc>,
    pub deployment_resource_version: Option<String>,
    pub desired_config_generator_version: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_string_round_trip() {
        for state in [
            ActualState::CreationRequested,
            ActualState::Terminating,
            ActualState::Unknown,
        ] {
            assert_eq!(ActualState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(
            DesiredState::from_str("restart_requested"),
            Some(DesiredState::RestartRequested)
        );
        assert_eq!(DesiredState::from_str("starting"), None);
    }

    #[test]
    fn test_restart_requested_is_never_reached() {
        assert!(DesiredState::Running.is_reached_by(ActualState::Running));
        assert!(!DesiredState::Stopped.is_reached_by(ActualState::Stopping));
        assert!(!DesiredState::RestartRequested.is_reached_by(ActualState::Running));
        assert!(!DesiredState::RestartRequested.is_reached_by(ActualState::Stopped));
    }
}
