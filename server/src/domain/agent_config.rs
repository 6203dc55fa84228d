//! Workspaces agent config domain model
//!
//! Agent configs are append-only: every edit produces a new version row, and
//! workspaces reference the version their manifest is generated from.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound for active plus stopped hours (one year)
pub const MAX_LIFETIME_HOURS: u32 = 8760;

/// One egress rule of the workspace network policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressRule {
    /// CIDR the workspace may reach
    pub allow: String,

    /// CIDRs carved out of `allow`
    #[serde(default)]
    pub except: Vec<String>,
}

/// Kubernetes-style resource limits and requests, e.g. `cpu: "500m"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub limits: BTreeMap<String, String>,

    #[serde(default)]
    pub requests: BTreeMap<String, String>,
}

impl ResourceRequirements {
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.requests.is_empty()
    }
}

/// Image pull secret made available to workspace pods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePullSecret {
    pub name: String,
    pub namespace: String,
}

/// One immutable version of an agent's workspace settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspacesAgentConfig {
    pub agent_id: String,

    /// Monotonic per agent, starting at 1
    pub version: i64,

    /// DNS zone workspace hosts are published under
    pub dns_zone: String,

    pub network_policy_enabled: bool,

    pub network_policy_egress: Vec<EgressRule>,

    /// Applied to containers that do not declare their own resources
    pub default_resources_per_workspace_container: ResourceRequirements,

    /// Quota for the whole workspace namespace
    pub max_resources_per_workspace: ResourceRequirements,

    pub image_pull_secrets: Vec<ImagePullSecret>,

    pub max_active_hours_before_stop: u32,

    pub max_stopped_hours_before_termination: u32,

    pub created_at: DateTime<Utc>,
}

/// Parameters for appending a new agent config version
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfigParams {
    pub dns_zone: String,

    #[serde(default = "default_network_policy_enabled")]
    pub network_policy_enabled: bool,

    #[serde(default = "default_network_policy_egress")]
    pub network_policy_egress: Vec<EgressRule>,

    #[serde(default)]
    pub default_resources_per_workspace_container: ResourceRequirements,

    #[serde(default)]
    pub max_resources_per_workspace: ResourceRequirements,

    #[serde(default)]
    pub image_pull_secrets: Vec<ImagePullSecret>,

    #[serde(default = "default_max_active_hours_before_stop")]
    pub max_active_hours_before_stop: u32,

    #[serde(default = "default_max_stopped_hours_before_termination")]
    pub max_stopped_hours_before_termination: u32,
}

fn default_network_policy_enabled() -> bool {
    true
}

fn default_network_policy_egress() -> Vec<EgressRule> {
    vec![EgressRule {
        allow: "0.0.0.0/0".to_string(),
        except: vec![
            "10.0.0.0/8".to_string(),
            "172.16.0.0/12".to_string(),
            "192.168.0.0/16".to_string(),
        ],
    }]
}

fn default_max_active_hours_before_stop() -> u32 {
    36
}

fn default_max_stopped_hours_before_termination() -> u32 {
    744 // 31 days
}

impl AgentConfigParams {
    /// Params with defaults for everything but the DNS zone
    pub fn new(dns_zone: impl Into<String>) -> Self {
        Self {
            dns_zone: dns_zone.into(),
            network_policy_enabled: default_network_policy_enabled(),
            network_policy_egress: default_network_policy_egress(),
            default_resources_per_workspace_container: ResourceRequirements::default(),
            max_resources_per_workspace: ResourceRequirements::default(),
            image_pull_secrets: Vec::new(),
            max_active_hours_before_stop: default_max_active_hours_before_stop(),
            max_stopped_hours_before_termination: default_max_stopped_hours_before_termination(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dns_zone.trim().is_empty() {
            return Err(Error::InvalidAgentConfig("dns_zone must not be empty".to_string()));
        }

        if self.max_active_hours_before_stop == 0 || self.max_stopped_hours_before_termination == 0
        {
            return Err(Error::InvalidAgentConfig(
                "lifecycle hour limits must be greater than zero".to_string(),
            ));
        }

        let total = self
            .max_active_hours_before_stop
            .saturating_add(self.max_stopped_hours_before_termination);
        if total > MAX_LIFETIME_HOURS {
            return Err(Error::InvalidAgentConfig(format!(
                "max_active_hours_before_stop + max_stopped_hours_before_termination must not exceed {}, got {}",
                MAX_LIFETIME_HOURS, total
            )));
        }

        for rule in &self.network_policy_egress {
            if rule.allow.trim().is_empty() {
                return Err(Error::InvalidAgentConfig(
                    "egress rule is missing allow".to_string(),
                ));
            }
        }

        Ok(())
    }
}
