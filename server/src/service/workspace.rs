//! Workspace service

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::workspace::{CreateWorkspaceParams, DesiredState, Workspace};
use crate::error::{Error, Result};
use crate::infra::agent_config_repository::AgentConfigRepository;
use crate::infra::clock::Clock;
use crate::infra::devfile::DevfileFlattener;
use crate::infra::store::AgentConfigStore;
use crate::infra::workspace_repository::{NewWorkspace, WorkspaceRepository};

/// Longest Kubernetes name the derived identities may take
const MAX_RESOURCE_NAME_LENGTH: usize = 63;

/// Length of the random suffix that keeps derived names unique
const SUFFIX_LENGTH: usize = 8;

/// Workspace service for creating workspaces and recording user intent
pub struct WorkspaceService {
    repository: Arc<WorkspaceRepository>,
    configs: Arc<AgentConfigRepository>,
    flattener: Arc<dyn DevfileFlattener>,
    clock: Arc<dyn Clock>,
    namespace_prefix: String,
}

impl WorkspaceService {
    /// Create a new workspace service
    pub fn new(
        repository: Arc<WorkspaceRepository>,
        configs: Arc<AgentConfigRepository>,
        flattener: Arc<dyn DevfileFlattener>,
        clock: Arc<dyn Clock>,
        namespace_prefix: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            configs,
            flattener,
            clock,
            namespace_prefix: namespace_prefix.into(),
        }
    }

    /// Create a workspace in `creation_requested`, pinned to the agent's
    /// latest config version
    pub async fn create(&self, params: CreateWorkspaceParams) -> Result<Workspace> {
        validate_identifier("agent_id", &params.agent_id)?;
        validate_identifier("user_id", &params.user_id)?;
        self.flattener.flatten(&params.devfile)?;

        let config = self
            .configs
            .latest(&params.agent_id)
            .await?
            .ok_or_else(|| Error::AgentConfigNotFound {
                agent_id: params.agent_id.clone(),
                version: "latest".to_string(),
            })?;

        let id = Uuid::new_v4();
        let suffix: String = id.simple().to_string().chars().take(SUFFIX_LENGTH).collect();
        let name = format!("workspace-{}-{}-{}", params.agent_id, params.user_id, suffix);
        let namespace = format!(
            "{}-{}-{}-{}",
            self.namespace_prefix, params.agent_id, params.user_id, suffix
        );

        if name.len() > MAX_RESOURCE_NAME_LENGTH || namespace.len() > MAX_RESOURCE_NAME_LENGTH {
            return Err(Error::InvalidParameter(format!(
                "agent_id and user_id are too long to derive a name within {} characters",
                MAX_RESOURCE_NAME_LENGTH
            )));
        }

        info!(
            "Creating workspace {} for agent {} with config version {}",
            name, params.agent_id, config.version
        );

        self.repository
            .create(NewWorkspace {
                id: id.to_string(),
                agent_id: params.agent_id,
                user_id: params.user_id,
                name,
                namespace,
                desired_state: params.desired_state.unwrap_or(DesiredState::Running),
                devfile: params.devfile,
                desired_config_generator_version: Some(config.version),
            })
            .await
    }

    /// Get a workspace by ID
    pub async fn get(&self, id: &str) -> Result<Workspace> {
        self.repository.get(id).await
    }

    /// Record a new desired state chosen by the user
    pub async fn update_desired_state(
        &self,
        id: &str,
        desired_state: DesiredState,
    ) -> Result<Workspace> {
        let workspace = self.repository.get(id).await?;

        if workspace.desired_state == DesiredState::Terminated {
            warn!("Rejecting desired state change of terminated workspace {}", id);
            return Err(Error::InvalidWorkspaceState {
                expected: "not terminated".to_string(),
                actual: workspace.desired_state.as_str().to_string(),
            });
        }

        info!(
            "Workspace {} desired state {} -> {}",
            id,
            workspace.desired_state.as_str(),
            desired_state.as_str()
        );

        self.repository
            .update_desired_state(id, desired_state, self.clock.now())
            .await?;

        self.repository.get(id).await
    }
}

/// Identifiers end up in Kubernetes names, so only DNS label characters pass
fn validate_identifier(field: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-');

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "{} must be a lowercase DNS label: {:?}",
            field, value
        )))
    }
}
