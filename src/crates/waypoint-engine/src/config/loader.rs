//! Configuration loader with dual-location support
//!
//! Loads configuration from:
//! 1. Default values
//! 2. User-level config: ~/.waypoint/waypoint.toml
//! 3. Project-level config: ./.waypoint/waypoint.toml
//! 4. `WAYPOINT_*` environment variables
//!
//! Later sources override earlier ones key by key: a project file that only
//! sets `execution.max_steps` keeps every other value from the user file.

use crate::config::schema::EngineConfig;
use crate::error::{EngineError, EngineResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Overrides `database.path`
pub const ENV_DATABASE_PATH: &str = "WAYPOINT_DATABASE_PATH";
/// Overrides `execution.max_concurrent_runs`
pub const ENV_MAX_CONCURRENT_RUNS: &str = "WAYPOINT_MAX_CONCURRENT_RUNS";
/// Overrides `logging.level`
pub const ENV_LOG_LEVEL: &str = "WAYPOINT_LOG_LEVEL";

/// Configuration loader that layers user, project and environment settings
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    user_config_path: Option<PathBuf>,
    project_config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader for the standard locations
    pub fn new() -> Self {
        Self {
            user_config_path: dirs::home_dir().map(|home| home.join(".waypoint").join("waypoint.toml")),
            project_config_path: std::env::current_dir()
                .ok()
                .map(|cwd| cwd.join(".waypoint").join("waypoint.toml")),
        }
    }

    /// Loader for explicit file locations
    pub fn with_paths(user_config_path: impl Into<PathBuf>, project_config_path: impl Into<PathBuf>) -> Self {
        Self {
            user_config_path: Some(user_config_path.into()),
            project_config_path: Some(project_config_path.into()),
        }
    }

    /// User config path, when a home directory is known
    pub fn user_config_path(&self) -> Option<&Path> {
        self.user_config_path.as_deref()
    }

    /// Project config path, when the working directory is known
    pub fn project_config_path(&self) -> Option<&Path> {
        self.project_config_path.as_deref()
    }

    /// Load configuration from every source, reading overrides from the
    /// process environment
    pub async fn load(&self) -> EngineResult<EngineConfig> {
        self.load_with_env(|key| std::env::var(key).ok()).await
    }

    /// Load configuration, reading overrides through `env`
    pub async fn load_with_env<F>(&self, env: F) -> EngineResult<EngineConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut merged = toml::Value::try_from(EngineConfig::default())
            .map_err(|e| EngineError::Config(format!("Failed to encode defaults: {}", e)))?;
        info!("Loading configuration with defaults");

        for path in [&self.user_config_path, &self.project_config_path].into_iter().flatten() {
            match Self::read_table(path).await? {
                Some(table) => {
                    debug!(path = %path.display(), "Loaded config file");
                    merge_values(&mut merged, toml::Value::Table(table));
                }
                None => debug!(path = %path.display(), "Config file not found"),
            }
        }

        let mut config: EngineConfig = merged
            .try_into()
            .map_err(|e| EngineError::Config(format!("Invalid configuration: {}", e)))?;
        apply_env_overrides(&mut config, env)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Parse a single file; `None` when it does not exist
    async fn read_table(path: &Path) -> EngineResult<Option<toml::Table>> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let table = toml::from_str::<toml::Table>(&content)
            .map_err(|e| EngineError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        Ok(Some(table))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively merge `overlay` into `base`; tables merge, everything else is
/// replaced
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides<F>(config: &mut EngineConfig, env: F) -> EngineResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = env(ENV_DATABASE_PATH).filter(|v| !v.is_empty()) {
        config.database.path = PathBuf::from(path);
    }
    if let Some(raw) = env(ENV_MAX_CONCURRENT_RUNS).filter(|v| !v.is_empty()) {
        config.execution.max_concurrent_runs = raw.parse().map_err(|_| {
            EngineError::Config(format!("{} must be a positive integer, got '{}'", ENV_MAX_CONCURRENT_RUNS, raw))
        })?;
    }
    if let Some(level) = env(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
        config.logging.level = level;
    }
    if config.execution.max_concurrent_runs == 0 {
        warn!("execution.max_concurrent_runs is 0; using 1");
        config.execution.max_concurrent_runs = 1;
    }
    Ok(())
}
