//! Storage interfaces consumed by the reconciliation engine

use async_trait::async_trait;

use crate::domain::agent_config::WorkspacesAgentConfig;
use crate::domain::workspace::{ReconciledWorkspace, Workspace};
use crate::error::Result;

/// Workspace rows as seen by the reconciliation engine
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Find a workspace by its identity under an agent
    async fn find_by_name(
        &self,
        agent_id: &str,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Workspace>>;

    /// Workspaces of the agent the cluster has not materialized yet, oldest first
    async fn list_unprovisioned(&self, agent_id: &str) -> Result<Vec<Workspace>>;

    /// Persist the outcome of one pass.
    ///
    /// Fails with `Error::StaleWorkspace` when the row's lock version no
    /// longer matches `expected_lock_version`.
    async fn apply_reconciliation(
        &self,
        workspace_id: &str,
        expected_lock_version: i64,
        update: &ReconciledWorkspace,
    ) -> Result<()>;
}

/// Read side of the append-only agent config table
#[async_trait]
pub trait AgentConfigStore: Send + Sync {
    async fn latest(&self, agent_id: &str) -> Result<Option<WorkspacesAgentConfig>>;

    async fn get_version(
        &self,
        agent_id: &str,
        version: i64,
    ) -> Result<Option<WorkspacesAgentConfig>>;
}
