//! Agent config repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::domain::agent_config::{AgentConfigParams, WorkspacesAgentConfig};
use crate::error::{Error, Result};
use crate::infra::store::AgentConfigStore;

const SELECT_COLUMNS: &str = r#"
    SELECT agent_id, version, dns_zone, network_policy_enabled, network_policy_egress,
           default_resources_per_workspace_container, max_resources_per_workspace,
           image_pull_secrets, max_active_hours_before_stop,
           max_stopped_hours_before_termination, created_at
    FROM workspaces_agent_configs
"#;

/// Database row for one agent config version
#[derive(Debug, FromRow)]
struct AgentConfigRow {
    agent_id: String,
    version: i64,
    dns_zone: String,
    network_policy_enabled: bool,
    network_policy_egress: String,
    default_resources_per_workspace_container: String,
    max_resources_per_workspace: String,
    image_pull_secrets: String,
    max_active_hours_before_stop: i64,
    max_stopped_hours_before_termination: i64,
    created_at: String,
}

impl TryFrom<AgentConfigRow> for WorkspacesAgentConfig {
    type Error = Error;

    fn try_from(row: AgentConfigRow) -> Result<Self> {
        let network_policy_egress = serde_json::from_str(&row.network_policy_egress)
            .map_err(|e| Error::Internal(format!("Failed to parse network_policy_egress: {}", e)))?;

        let default_resources_per_workspace_container =
            serde_json::from_str(&row.default_resources_per_workspace_container).map_err(|e| {
                Error::Internal(format!("Failed to parse default resources: {}", e))
            })?;

        let max_resources_per_workspace = serde_json::from_str(&row.max_resources_per_workspace)
            .map_err(|e| Error::Internal(format!("Failed to parse max resources: {}", e)))?;

        let image_pull_secrets = serde_json::from_str(&row.image_pull_secrets)
            .map_err(|e| Error::Internal(format!("Failed to parse image_pull_secrets: {}", e)))?;

        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
            .with_timezone(&Utc);

        Ok(WorkspacesAgentConfig {
            agent_id: row.agent_id,
            version: row.version,
            dns_zone: row.dns_zone,
            network_policy_enabled: row.network_policy_enabled,
            network_policy_egress,
            default_resources_per_workspace_container,
            max_resources_per_workspace,
            image_pull_secrets,
            max_active_hours_before_stop: row.max_active_hours_before_stop as u32,
            max_stopped_hours_before_termination: row.max_stopped_hours_before_termination as u32,
            created_at,
        })
    }
}

/// Append-only store of agent config versions
pub struct AgentConfigRepository {
    pool: SqlitePool,
}

impl AgentConfigRepository {
    /// Create a new repository with the given pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a new version for the agent. Existing versions are never modified.
    pub async fn append(
        &self,
        agent_id: &str,
        params: AgentConfigParams,
    ) -> Result<WorkspacesAgentConfig> {
        params.validate()?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let (current,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(version), 0) FROM workspaces_agent_configs WHERE agent_id = ?",
        )
        .bind(agent_id)
        .fetch_one(&mut *tx)
        .await?;
        let version = current + 1;

        sqlx::query(
            r#"
            INSERT INTO workspaces_agent_configs (
                agent_id, version, dns_zone, network_policy_enabled, network_policy_egress,
                default_resources_per_workspace_container, max_resources_per_workspace,
                image_pull_secrets, max_active_hours_before_stop,
                max_stopped_hours_before_termination, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(agent_id)
        .bind(version)
        .bind(&params.dns_zone)
        .bind(params.network_policy_enabled)
        .bind(serde_json::to_string(&params.network_policy_egress)?)
        .bind(serde_json::to_string(
            &params.default_resources_per_workspace_container,
        )?)
        .bind(serde_json::to_string(&params.max_resources_per_workspace)?)
        .bind(serde_json::to_string(&params.image_pull_secrets)?)
        .bind(params.max_active_hours_before_stop as i64)
        .bind(params.max_stopped_hours_before_termination as i64)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_version(agent_id, version)
            .await?
            .ok_or_else(|| Error::AgentConfigNotFound {
                agent_id: agent_id.to_string(),
                version: version.to_string(),
            })
    }
}

#[async_trait]
impl AgentConfigStore for AgentConfigRepository {
    async fn latest(&self, agent_id: &str) -> Result<Option<WorkspacesAgentConfig>> {
        let query = format!("{} WHERE agent_id = ? ORDER BY version DESC LIMIT 1", SELECT_COLUMNS);
        let row: Option<AgentConfigRow> = sqlx::query_as(&query)
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(WorkspacesAgentConfig::try_from).transpose()
    }

    async fn get_version(
        &self,
        agent_id: &str,
        version: i64,
    ) -> Result<Option<WorkspacesAgentConfig>> {
        let query = format!("{} WHERE agent_id = ? AND version = ?", SELECT_COLUMNS);
        let row: Option<AgentConfigRow> = sqlx::query_as(&query)
            .bind(agent_id)
            .bind(version)
            .fetch_optional(&self.pool)
            .await?;

        row.map(WorkspacesAgentConfig::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent_config::ImagePullSecret;
    use crate::infra::sqlite::memory_pool;

    #[tokio::test]
    async fn test_append_assigns_increasing_versions() {
        let repo = AgentConfigRepository::new(memory_pool().await);

        let first = repo
            .append("agent-1", AgentConfigParams::new("old.example.dev"))
            .await
            .expect("Failed to append config");
        let second = repo
            .append("agent-1", AgentConfigParams::new("new.example.dev"))
            .await
            .expect("Failed to append config");
        let other_agent = repo
            .append("agent-2", AgentConfigParams::new("other.example.dev"))
            .await
            .expect("Failed to append config");

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(other_agent.version, 1);
    }

    #[tokio::test]
    async fn test_old_versions_stay_readable() {
        let repo = AgentConfigRepository::new(memory_pool().await);

        let mut params = AgentConfigParams::new("old.example.dev");
        params.image_pull_secrets = vec![ImagePullSecret {
            name: "registry".to_string(),
            namespace: "default".to_string(),
        }];
        repo.append("agent-1", params).await.unwrap();
        repo.append("agent-1", AgentConfigParams::new("new.example.dev"))
            .await
            .unwrap();

        let latest = repo.latest("agent-1").await.unwrap().unwrap();
        assert_eq!(latest.dns_zone, "new.example.dev");

        let pinned = repo.get_version("agent-1", 1).await.unwrap().unwrap();
        assert_eq!(pinned.dns_zone, "old.example.dev");
        assert_eq!(pinned.image_pull_secrets.len(), 1);
        assert!(pinned.network_policy_enabled);
    }

    #[tokio::test]
    async fn test_missing_config() {
        let repo = AgentConfigRepository::new(memory_pool().await);

        assert!(repo.latest("agent-1").await.unwrap().is_none());
        assert!(repo.get_version("agent-1", 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_rejects_invalid_params() {
        let repo = AgentConfigRepository::new(memory_pool().await);

        let result = repo.append("agent-1", AgentConfigParams::new("")).await;
        assert!(matches!(result, Err(Error::InvalidAgentConfig(_))));
        assert!(repo.latest("agent-1").await.unwrap().is_none());
    }
}
