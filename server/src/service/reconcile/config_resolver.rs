//! Resolution of the agent config version pinned to each workspace

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, error};

use crate::domain::agent_config::WorkspacesAgentConfig;
use crate::domain::workspace::Workspace;
use crate::infra::store::AgentConfigStore;

/// Immutable agent config versions loaded for one reconciliation pass.
///
/// Every version is read whole, once, so all fields used for a workspace
/// come from the same row.
#[derive(Debug, Default)]
pub struct ConfigSnapshots {
    versions: HashMap<i64, Arc<WorkspacesAgentConfig>>,
    latest: Option<Arc<WorkspacesAgentConfig>>,
}

impl ConfigSnapshots {
    /// Config for a workspace: its pinned version, or the latest one when
    /// the workspace has never been pinned.
    pub fn resolve(&self, workspace: &Workspace) -> Option<Arc<WorkspacesAgentConfig>> {
        match workspace.desired_config_generator_version {
            Some(version) => self.versions.get(&version).cloned(),
            None => self.latest.clone(),
        }
    }
}

/// Loads the config snapshots a batch of workspaces needs
pub struct ConfigResolver {
    store: Arc<dyn AgentConfigStore>,
}

impl ConfigResolver {
    pub fn new(store: Arc<dyn AgentConfigStore>) -> Self {
        Self { store }
    }

    /// Load each distinct pinned version once. Versions that fail to load
    /// are left out; workspaces pinned to them resolve to `None`.
    pub async fn load<'a, I>(&self, agent_id: &str, workspaces: I) -> ConfigSnapshots
    where
        I: IntoIterator<Item = &'a Workspace>,
    {
        let mut pinned = BTreeSet::new();
        let mut needs_latest = false;
        for workspace in workspaces {
            match workspace.desired_config_generator_version {
                Some(version) => {
                    pinned.insert(version);
                }
                None => needs_latest = true,
            }
        }

        let mut snapshots = ConfigSnapshots::default();

        for version in pinned {
            match self.store.get_version(agent_id, version).await {
                Ok(Some(config)) => {
                    snapshots.versions.insert(version, Arc::new(config));
                }
                Ok(None) => {
                    error!(agent_id, version, "Pinned workspaces agent config version is missing");
                }
                Err(e) => {
                    error!(agent_id, version, "Failed to load workspaces agent config: {}", e);
                }
            }
        }

        if needs_latest {
            match self.store.latest(agent_id).await {
                Ok(Some(config)) => {
                    debug!(agent_id, version = config.version, "Pinning unpinned workspaces to latest config");
                    let config = Arc::new(config);
                    snapshots.versions.insert(config.version, config.clone());
                    snapshots.latest = Some(config);
                }
                Ok(None) => {
                    error!(agent_id, "Agent has no workspaces agent config");
                }
                Err(e) => {
                    error!(agent_id, "Failed to load latest workspaces agent config: {}", e);
                }
            }
        }

        snapshots
    }
}
