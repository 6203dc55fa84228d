//! Server configuration

use serde::{Deserialize, Serialize};

use crate::domain::reconcile::Settings;

/// Environment variable prefix, e.g. `RECONCILER_HTTP_PORT`
const ENV_PREFIX: &str = "RECONCILER";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server host
    #[serde(default = "default_http_host")]
    pub http_host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Database URL (SQLite)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Interval the agent waits between full reconciliations
    #[serde(default = "default_full_reconciliation_interval")]
    pub full_reconciliation_interval_seconds: u64,

    /// Interval the agent waits between partial reconciliations
    #[serde(default = "default_partial_reconciliation_interval")]
    pub partial_reconciliation_interval_seconds: u64,

    /// Prefix of the Kubernetes namespace derived for each new workspace
    #[serde(default = "default_namespace_prefix")]
    pub namespace_prefix: String,

    /// Log output: "text" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_database_url() -> String {
    "sqlite:data/reconciler.db?mode=rwc".to_string()
}

fn default_full_reconciliation_interval() -> u64 {
    3600 // 1 hour
}

fn default_partial_reconciliation_interval() -> u64 {
    10
}

fn default_namespace_prefix() -> String {
    "rd-ns".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from defaults overlaid with `RECONCILER_*` environment variables
    pub fn load() -> anyhow::Result<Self> {
        let config = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Config::default())?)
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Polling intervals handed back to the agent on every reconcile response
    pub fn reconcile_settings(&self) -> Settings {
        Settings {
            full_reconciliation_interval_seconds: self.full_reconciliation_interval_seconds,
            partial_reconciliation_interval_seconds: self.partial_reconciliation_interval_seconds,
        }
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_host: default_http_host(),
            http_port: default_http_port(),
            database_url: default_database_url(),
            full_reconciliation_interval_seconds: default_full_reconciliation_interval(),
            partial_reconciliation_interval_seconds: default_partial_reconciliation_interval(),
            namespace_prefix: default_namespace_prefix(),
            log_format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.namespace_prefix, "rd-ns");
        assert!(!config.json_logs());
    }

    #[test]
    fn test_reconcile_settings_from_config() {
        let config = Config {
            full_reconciliation_interval_seconds: 600,
            partial_reconciliation_interval_seconds: 5,
            ..Default::default()
        };

        let settings = config.reconcile_settings();
        assert_eq!(settings.full_reconciliation_interval_seconds, 600);
        assert_eq!(settings.partial_reconciliation_interval_seconds, 5);
    }
}
