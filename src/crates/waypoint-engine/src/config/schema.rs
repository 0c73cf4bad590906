//! Configuration schema

use crate::models::{DEFAULT_EXPIRES_IN_MINUTES, DEFAULT_PRIORITY};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use waypoint_graph::DEFAULT_MAX_STEPS;

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Execution configuration
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Human intervention defaults
    #[serde(default)]
    pub interventions: InterventionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file
    pub path: PathBuf,

    /// Connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = dirs::home_dir()
            .map(|home| home.join(".waypoint").join("waypoint.db"))
            .unwrap_or_else(|| PathBuf::from(".waypoint").join("waypoint.db"));
        Self {
            path,
            max_connections: 5,
        }
    }
}

/// Execution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Runs traversing at the same time; further dispatches wait
    pub max_concurrent_runs: usize,

    /// Node invocations allowed in one traversal before it fails
    pub max_steps: usize,

    /// Capacity of the node lifecycle event channel
    pub event_buffer: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 8,
            max_steps: DEFAULT_MAX_STEPS,
            event_buffer: 32,
        }
    }
}

/// Defaults for intervention requests raised at human nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterventionConfig {
    /// Priority when the node does not set one
    pub default_priority: i64,

    /// Expiry when the node does not set one
    pub default_expires_in_minutes: i64,

    /// Seconds between expiry sweeps; 0 disables the sweeper
    pub sweep_interval_secs: u64,
}

impl Default for InterventionConfig {
    fn default() -> Self {
        Self {
            default_priority: DEFAULT_PRIORITY,
            default_expires_in_minutes: DEFAULT_EXPIRES_IN_MINUTES,
            sweep_interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
