//! Business logic layer

pub mod agent_config;
pub mod reconcile;
pub mod workspace;
