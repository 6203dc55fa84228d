//! Workspaces agent config service

use std::sync::Arc;

use tracing::info;

use crate::domain::agent_config::{AgentConfigParams, WorkspacesAgentConfig};
use crate::error::{Error, Result};
use crate::infra::agent_config_repository::AgentConfigRepository;
use crate::infra::store::AgentConfigStore;

/// Appends and reads agent config versions.
///
/// Versions are never edited in place; workspaces keep rendering from the
/// version they were pinned to.
pub struct AgentConfigService {
    repository: Arc<AgentConfigRepository>,
}

impl AgentConfigService {
    pub fn new(repository: Arc<AgentConfigRepository>) -> Self {
        Self { repository }
    }

    /// Store a new config version for the agent
    pub async fn update(
        &self,
        agent_id: &str,
        params: AgentConfigParams,
    ) -> Result<WorkspacesAgentConfig> {
        let config = self.repository.append(agent_id, params).await?;
        info!(
            "Agent {} workspaces config is now at version {}",
            agent_id, config.version
        );
        Ok(config)
    }

    /// Latest config version of the agent
    pub async fn latest(&self, agent_id: &str) -> Result<WorkspacesAgentConfig> {
        self.repository
            .latest(agent_id)
            .await?
            .ok_or_else(|| Error::AgentConfigNotFound {
                agent_id: agent_id.to_string(),
                version: "latest".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::sqlite::memory_pool;

    #[tokio::test]
    async fn test_update_appends_versions() {
        let service = AgentConfigService::new(Arc::new(AgentConfigRepository::new(
            memory_pool().await,
        )));

        assert!(matches!(
            service.latest("agent-1").await,
            Err(Error::AgentConfigNotFound { .. })
        ));

        service
            .update("agent-1", AgentConfigParams::new("a.example.dev"))
            .await
            .unwrap();
        let second = service
            .update("agent-1", AgentConfigParams::new("b.example.dev"))
            .await
            .unwrap();

        assert_eq!(second.version, 2);
        assert_eq!(service.latest("agent-1").await.unwrap().dns_zone, "b.example.dev");
    }
}
