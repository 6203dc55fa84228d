//! Elevo Workspace Reconciliation Server
//!
//! This server reconciles the desired and actual state of remote development
//! workspaces for the cluster agents that poll it, and exposes the
//! administrative HTTP API those workspaces are created through.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod domain;
mod error;
mod infra;
mod service;

pub use crate::config::Config;
pub use error::Result;

use infra::agent_config_repository::AgentConfigRepository;
use infra::clock::{Clock, SystemClock};
use infra::devfile::{DevfileFlattener, YamlDevfileFlattener};
use infra::workspace_repository::WorkspaceRepository;
use service::agent_config::AgentConfigService;
use service::reconcile::ReconcileService;
use service::workspace::WorkspaceService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub workspace_service: Arc<WorkspaceService>,
    pub agent_config_service: Arc<AgentConfigService>,
    pub reconcile_service: Arc<ReconcileService>,
}

impl AppState {
    /// Wire repositories and services on top of a migrated pool
    pub fn new(config: Arc<Config>, pool: SqlitePool) -> Self {
        let workspace_repository = Arc::new(WorkspaceRepository::new(pool.clone()));
        let agent_config_repository = Arc::new(AgentConfigRepository::new(pool));
        let flattener: Arc<dyn DevfileFlattener> = Arc::new(YamlDevfileFlattener);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let workspace_service = Arc::new(WorkspaceService::new(
            workspace_repository.clone(),
            agent_config_repository.clone(),
            flattener.clone(),
            clock.clone(),
            config.namespace_prefix.clone(),
        ));

        let agent_config_service =
            Arc::new(AgentConfigService::new(agent_config_repository.clone()));

        let reconcile_service = Arc::new(ReconcileService::new(
            workspace_repository,
            agent_config_repository,
            flattener,
            clock,
        ));

        Self {
            config,
            workspace_service,
            agent_config_service,
            reconcile_service,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(Config::load()?);

    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    if config.json_logs() {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    let http_addr: SocketAddr = format!("{}:{}", config.http_host, config.http_port).parse()?;

    info!("Starting Workspace Reconciliation Server");
    info!("HTTP listening on {}", http_addr);

    // Initialize infrastructure
    let pool = infra::sqlite::init(&config.database_url).await?;
    let state = AppState::new(config.clone(), pool);

    let app = api::http::create_router(state);

    axum::serve(
        tokio::net::TcpListener::bind(http_addr).await?,
        app.into_make_service(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
