//! Reconciliation of agent-reported workspace state
//!
//! One call handles one agent poll: reported infos are matched to stored
//! workspaces, each workspace is pushed through lifecycle evaluation,
//! transition resolution and manifest generation, and the outcome is written
//! back once per workspace. Failures stay local to the workspace they hit.

pub mod config_generator;
pub mod config_resolver;
pub mod issues;
pub mod lifecycle;
pub mod transition;

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use tracing::{debug, error, info};

use crate::domain::reconcile::{
    ReconcileParams, ReconcilePayload, ReconcileResponse, Settings, UpdateType,
    WorkspaceAgentInfo, WorkspaceRailsInfo,
};
use crate::domain::workspace::{ReconciledWorkspace, Workspace};
use crate::infra::clock::Clock;
use crate::infra::devfile::DevfileFlattener;
use crate::infra::store::{AgentConfigStore, WorkspaceStore};

use self::config_generator::{ConfigGenerator, ManifestInput};
use self::config_resolver::{ConfigResolver, ConfigSnapshots};
use self::issues::ReconcileIssue;
use self::lifecycle::LifecycleInput;
use self::transition::TransitionInput;

/// Response for the agent plus everything that went wrong along the way
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub response: ReconcileResponse,
    pub issues: Vec<ReconcileIssue>,
}

/// A stored workspace and the agent's report about it, if any
struct WorkItem<'a> {
    workspace: Workspace,
    report: Option<&'a WorkspaceAgentInfo>,
}

/// Result of processing one workspace. `entry` is `None` when nothing was
/// committed and the workspace is left out of the response.
struct Processed {
    entry: Option<WorkspaceRailsInfo>,
    issues: Vec<ReconcileIssue>,
}

/// Reconciliation coordinator
pub struct ReconcileService {
    workspaces: Arc<dyn WorkspaceStore>,
    resolver: ConfigResolver,
    generator: ConfigGenerator,
    clock: Arc<dyn Clock>,
}

impl ReconcileService {
    pub fn new(
        workspaces: Arc<dyn WorkspaceStore>,
        configs: Arc<dyn AgentConfigStore>,
        flattener: Arc<dyn DevfileFlattener>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            workspaces,
            resolver: ConfigResolver::new(configs),
            generator: ConfigGenerator::new(flattener),
            clock,
        }
    }

    /// Reconcile one agent poll.
    ///
    /// Never fails as a whole once started; per-workspace problems are
    /// logged and returned in `issues`.
    pub async fn reconcile(
        &self,
        agent_id: &str,
        params: ReconcileParams,
        settings: Settings,
    ) -> ReconcileOutcome {
        let now = self.clock.now();
        let mut issues = Vec::new();

        let unprovisioned = match params.update_type {
            UpdateType::Full => match self.workspaces.list_unprovisioned(agent_id).await {
                Ok(workspaces) => workspaces,
                Err(e) => {
                    error!(agent_id, "Failed to list unprovisioned workspaces: {}", e);
                    return ReconcileOutcome {
                        response: ReconcileResponse {
                            payload: ReconcilePayload {
                                settings,
                                workspace_rails_infos: Vec::new(),
                            },
                            message: Some(format!(
                                "Reconciliation could not be started: {}",
                                e
                            )),
                        },
                        issues,
                    };
                }
            },
            UpdateType::Partial => Vec::new(),
        };

        let mut items = self
            .match_infos(agent_id, &params.workspace_agent_infos, &mut issues)
            .await;

        let reported: HashSet<String> = items.iter().map(|i| i.workspace.id.clone()).collect();
        items.extend(
            unprovisioned
                .into_iter()
                .filter(|workspace| !reported.contains(&workspace.id))
                .map(|workspace| WorkItem {
                    workspace,
                    report: None,
                }),
        );

        let snapshots = self
            .resolver
            .load(agent_id, items.iter().map(|item| &item.workspace))
            .await;

        let results = join_all(items.into_iter().map(|item| {
            let name = item.workspace.name.clone();
            let namespace = item.workspace.namespace.clone();
            let processing = AssertUnwindSafe(self.process(agent_id, item, &snapshots, now))
                .catch_unwind();
            async move {
                match processing.await {
                    Ok(processed) => processed,
                    Err(_) => Processed {
                        entry: None,
                        issues: vec![ReconcileIssue::ProcessingPanicked { name, namespace }],
                    },
                }
            }
        }))
        .await;

        let mut workspace_rails_infos = Vec::with_capacity(results.len());
        for processed in results {
            issues.extend(processed.issues);
            workspace_rails_infos.extend(processed.entry);
        }

        for issue in &issues {
            issue.log(agent_id);
        }

        info!(
            agent_id,
            update_type = params.update_type.as_str(),
            reported = params.workspace_agent_infos.len(),
            responded = workspace_rails_infos.len(),
            issues = issues.len(),
            "Reconciliation completed"
        );

        ReconcileOutcome {
            response: ReconcileResponse {
                payload: ReconcilePayload {
                    settings,
                    workspace_rails_infos,
                },
                message: None,
            },
            issues,
        }
    }

    /// Look up the stored workspace for every distinct reported info, keeping
    /// request order.
    async fn match_infos<'a>(
        &self,
        agent_id: &str,
        infos: &'a [WorkspaceAgentInfo],
        issues: &mut Vec<ReconcileIssue>,
    ) -> Vec<WorkItem<'a>> {
        let mut seen = HashSet::new();
        let mut distinct = Vec::with_capacity(infos.len());
        for info in infos {
            if seen.insert(info.key()) {
                distinct.push(info);
            } else {
                issues.push(ReconcileIssue::DuplicateAgentInfo {
                    name: info.name.clone(),
                    namespace: info.namespace.clone(),
                });
            }
        }

        let lookups = join_all(distinct.iter().map(|info| {
            self.workspaces
                .find_by_name(agent_id, &info.name, &info.namespace)
        }))
        .await;

        let mut items = Vec::with_capacity(distinct.len());
        for (info, lookup) in distinct.into_iter().zip(lookups) {
            match lookup {
                Ok(Some(workspace)) => items.push(WorkItem {
                    workspace,
                    report: Some(info),
                }),
                Ok(None) => issues.push(ReconcileIssue::orphaned(info)),
                Err(e) => issues.push(ReconcileIssue::LookupFailed {
                    name: info.name.clone(),
                    namespace: info.namespace.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        items
    }

    async fn process(
        &self,
        agent_id: &str,
        item: WorkItem<'_>,
        snapshots: &ConfigSnapshots,
        now: DateTime<Utc>,
    ) -> Processed {
        let WorkItem { workspace, report } = item;
        let mut issues = Vec::new();

        let config = snapshots.resolve(&workspace);
        if config.is_none() {
            issues.push(ReconcileIssue::AgentConfigUnavailable {
                name: workspace.name.clone(),
                namespace: workspace.namespace.clone(),
                version: workspace.desired_config_generator_version,
            });
        }

        // Lifecycle limits apply to the state the agent is reporting now
        let observed_state = report
            .filter(|info| info.error_details.is_none())
            .map(|info| info.current_actual_state)
            .unwrap_or(workspace.actual_state);

        let desired_state = config
            .as_deref()
            .and_then(|config| {
                lifecycle::evaluate(&LifecycleInput {
                    desired_state: workspace.desired_state,
                    actual_state: observed_state,
                    desired_state_updated_at: workspace.desired_state_updated_at,
                    max_active_hours_before_stop: config.max_active_hours_before_stop,
                    max_stopped_hours_before_termination: config
                        .max_stopped_hours_before_termination,
                    now,
                })
            })
            .unwrap_or(workspace.desired_state);

        let transition = transition::resolve(&TransitionInput {
            desired_state,
            actual_state: workspace.actual_state,
            report,
            user_intervened: workspace.desired_state_changed_since_response(),
        });

        if let (Some(anomaly), Some(info)) = (&transition.anomaly, report) {
            issues.push(ReconcileIssue::abnormal(
                info,
                transition.desired_state,
                anomaly,
            ));
        }

        let config_to_apply = match (transition.config, config.as_deref()) {
            (Some(request), Some(config)) => {
                let input = ManifestInput {
                    workspace: &workspace,
                    desired_state: transition.desired_state,
                    config,
                    request,
                };
                match self.generator.generate(&input) {
                    Ok(manifest) => Some(manifest),
                    Err(e) => {
                        issues.push(ReconcileIssue::ConfigGenerationFailed {
                            name: workspace.name.clone(),
                            namespace: workspace.namespace.clone(),
                            reason: e.to_string(),
                        });
                        None
                    }
                }
            }
            _ => None,
        };

        let desired_state_updated_at = if transition.desired_state != workspace.desired_state {
            now
        } else {
            workspace.desired_state_updated_at
        };

        let deployment_resource_version = match report {
            Some(info) if info.workspace_exists => info.resource_version.clone(),
            _ => workspace.deployment_resource_version.clone(),
        };

        let update = ReconciledWorkspace {
            desired_state: transition.desired_state,
            desired_state_updated_at,
            actual_state: transition.actual_state,
            responded_to_agent_at: now.max(desired_state_updated_at),
            deployment_resource_version,
            desired_config_generator_version: workspace
                .desired_config_generator_version
                .or_else(|| config.as_ref().map(|config| config.version)),
        };

        if let Err(e) = self
            .workspaces
            .apply_reconciliation(&workspace.id, workspace.lock_version, &update)
            .await
        {
            issues.push(ReconcileIssue::PersistFailed {
                name: workspace.name.clone(),
                namespace: workspace.namespace.clone(),
                reason: e.to_string(),
            });
            return Processed {
                entry: None,
                issues,
            };
        }

        debug!(
            agent_id,
            workspace = workspace.name.as_str(),
            desired_state = update.desired_state.as_str(),
            actual_state = update.actual_state.as_str(),
            config_sent = config_to_apply.is_some(),
            "Workspace reconciled"
        );

        Processed {
            entry: Some(WorkspaceRailsInfo {
                name: workspace.name,
                namespace: workspace.namespace,
                desired_state: update.desired_state,
                actual_state: update.actual_state,
                deployment_resource_version: update.deployment_resource_version,
                config_to_apply,
                image_pull_secrets: config
                    .map(|config| config.image_pull_secrets.clone())
                    .unwrap_or_default(),
            }),
            issues,
        }
    }
}
