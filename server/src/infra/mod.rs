//! Infrastructure layer

pub mod agent_config_repository;
pub mod clock;
pub mod devfile;
pub mod sqlite;
pub mod store;
pub mod workspace_repository;
