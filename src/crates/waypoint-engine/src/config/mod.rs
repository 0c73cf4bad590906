//! Configuration management for Waypoint
//!
//! Supports dual-location configuration:
//! - User-level: ~/.waypoint/waypoint.toml
//! - Project-level: ./.waypoint/waypoint.toml
//!
//! Project-level config overrides user-level config, and `WAYPOINT_*`
//! environment variables override both.

mod loader;
mod schema;

pub use loader::{ConfigLoader, ENV_DATABASE_PATH, ENV_LOG_LEVEL, ENV_MAX_CONCURRENT_RUNS};
pub use schema::{DatabaseConfig, EngineConfig, ExecutionConfig, InterventionConfig, LoggingConfig};

use crate::error::EngineResult;

/// Load configuration from every location, later sources winning
pub async fn load_config() -> EngineResult<EngineConfig> {
    ConfigLoader::new().load().await
}
