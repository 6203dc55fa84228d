//! Workspace repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::domain::workspace::{ActualState, DesiredState, ReconciledWorkspace, Workspace};
use crate::error::{Error, Result};
use crate::infra::store::WorkspaceStore;

const SELECT_COLUMNS: &str = r#"
    SELECT id, agent_id, user_id, name, namespace, desired_state, actual_state,
           desired_state_updated_at, responded_to_agent_at, deployment_resource_version,
           devfile, desired_config_generator_version, lock_version, created_at, updated_at
    FROM workspaces
"#;

/// Database row for workspace
#[derive(Debug, FromRow)]
struct WorkspaceRow {
    id: String,
    agent_id: String,
    user_id: String,
    name: String,
    namespace: String,
    desired_state: String,
    actual_state: String,
    desired_state_updated_at: String,
    responded_to_agent_at: Option<String>,
    deployment_resource_version: Option<String>,
    devfile: String,
    desired_config_generator_version: Option<i64>,
    lock_version: i64,
    created_at: String,
    updated_at: String,
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

impl TryFrom<WorkspaceRow> for Workspace {
    type Error = Error;

    fn try_from(row: WorkspaceRow) -> Result<Self> {
        let desired_state = DesiredState::from_str(&row.desired_state).ok_or_else(|| {
            Error::Internal(format!("Invalid desired state: {}", row.desired_state))
        })?;

        let actual_state = ActualState::from_str(&row.actual_state)
            .ok_or_else(|| Error::Internal(format!("Invalid actual state: {}", row.actual_state)))?;

        let responded_to_agent_at = row
            .responded_to_agent_at
            .as_deref()
            .map(|value| parse_timestamp("responded_to_agent_at", value))
            .transpose()?;

        Ok(Workspace {
            id: row.id,
            agent_id: row.agent_id,
            user_id: row.user_id,
            name: row.name,
            namespace: row.namespace,
            desired_state,
            actual_state,
            desired_state_updated_at: parse_timestamp(
                "desired_state_updated_at",
                &row.desired_state_updated_at,
            )?,
            responded_to_agent_at,
            deployment_resource_version: row.deployment_resource_version,
            devfile: row.devfile,
            desired_config_generator_version: row.desired_config_generator_version,
            lock_version: row.lock_version,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        })
    }
}

/// New workspace row, identity already derived
#[derive(Debug, Clone)]
pub struct NewWorkspace {
    pub id: String,
    pub agent_id: String,
    pub user_id: String,
    pub name: String,
    pub namespace: String,
    pub desired_state: DesiredState,
    pub devfile: String,
    pub desired_config_generator_version: Option<i64>,
}

/// Workspace repository for database operations
pub struct WorkspaceRepository {
    pool: SqlitePool,
}

impl WorkspaceRepository {
    /// Create a new repository with the given pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a workspace in `creation_requested`
    pub async fn create(&self, new: NewWorkspace) -> Result<Workspace> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO workspaces (
                id, agent_id, user_id, name, namespace, desired_state, actual_state,
                desired_state_updated_at, devfile, desired_config_generator_version,
                lock_version, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&new.id)
        .bind(&new.agent_id)
        .bind(&new.user_id)
        .bind(&new.name)
        .bind(&new.namespace)
        .bind(new.desired_state.as_str())
        .bind(ActualState::CreationRequested.as_str())
        .bind(&now)
        .bind(&new.devfile)
        .bind(new.desired_config_generator_version)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get(&new.id).await
    }

    /// Get a workspace by ID
    pub async fn get(&self, id: &str) -> Result<Workspace> {
        let query = format!("{} WHERE id = ?", SELECT_COLUMNS);
        let row: WorkspaceRow = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::WorkspaceNotFound(id.to_string()))?;

        row.try_into()
    }

    /// Record a user-initiated desired state change
    pub async fn update_desired_state(
        &self,
        id: &str,
        desired_state: DesiredState,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE workspaces
            SET desired_state = ?, desired_state_updated_at = ?, updated_at = ?,
                lock_version = lock_version + 1
            WHERE id = ?
            "#,
        )
        .bind(desired_state.as_str())
        .bind(at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::WorkspaceNotFound(id.to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl WorkspaceStore for WorkspaceRepository {
    async fn find_by_name(
        &self,
        agent_id: &str,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Workspace>> {
        let query = format!(
            "{} WHERE agent_id = ? AND name = ? AND namespace = ?",
            SELECT_COLUMNS
        );
        let row: Option<WorkspaceRow> = sqlx::query_as(&query)
            .bind(agent_id)
            .bind(name)
            .bind(namespace)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Workspace::try_from).transpose()
    }

    async fn list_unprovisioned(&self, agent_id: &str) -> Result<Vec<Workspace>> {
        let query = format!(
            "{} WHERE agent_id = ? AND actual_state = ? ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS
        );
        let rows: Vec<WorkspaceRow> = sqlx::query_as(&query)
            .bind(agent_id)
            .bind(ActualState::CreationRequested.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Workspace::try_from).collect()
    }

    async fn apply_reconciliation(
        &self,
        workspace_id: &str,
        expected_lock_version: i64,
        update: &ReconciledWorkspace,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE workspaces
            SET desired_state = ?, desired_state_updated_at = ?, actual_state = ?,
                responded_to_agent_at = ?, deployment_resource_version = ?,
                desired_config_generator_version = ?, updated_at = ?,
                lock_version = lock_version + 1
            WHERE id = ? AND lock_version = ?
            "#,
        )
        .bind(update.desired_state.as_str())
        .bind(update.desired_state_updated_at.to_rfc3339())
        .bind(update.actual_state.as_str())
        .bind(update.responded_to_agent_at.to_rfc3339())
        .bind(&update.deployment_resource_version)
        .bind(update.desired_config_generator_version)
        .bind(Utc::now().to_rfc3339())
        .bind(workspace_id)
        .bind(expected_lock_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::StaleWorkspace(workspace_id.to_string()));
        }

        Ok(())
    }
}
