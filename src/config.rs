//! Broker Configuration Module
//!
//! The broker loads a JSON config file (routes, port, heartbeat, filter
//! rule). `--port` on the CLI overrides the file; `--create-config` writes
//! the default shape and exits.
//!
//! `compression` and `logRetention` are accepted for config compatibility
//! but not wired to any behavior.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::broker::{CaptureMode, FilterRule, RouteConfig};
use crate::error::{Result, TracefabError};

pub const DEFAULT_PORT: u16 = 9120;
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Top-level broker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrokerConfig {
    pub port: u16,
    pub heartbeat_secs: u64,
    /// How subscriptions combine include and exclude patterns
    pub filter_rule: FilterRule,
    /// Accepted and ignored; compression is not implemented
    pub compression: Option<serde_json::Value>,
    /// Accepted and ignored; retention is not implemented
    pub log_retention: Option<serde_json::Value>,
    pub routes: Vec<RouteConfig>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            filter_rule: FilterRule::default(),
            compression: None,
            log_retention: None,
            routes: vec![RouteConfig::console("/", CaptureMode::Full)],
        }
    }
}

impl BrokerConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TracefabError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let content = fs::read_to_string(path).map_err(|e| TracefabError::ConfigError {
            reason: format!("Failed to read config file: {}", e),
        })?;
        serde_json::from_str(&content).map_err(|e| TracefabError::ConfigError {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Save configuration, creating parent directories if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| TracefabError::ConfigError {
                    reason: format!("Failed to create config directory: {}", e),
                })?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| TracefabError::ConfigError {
            reason: format!("Failed to write config file: {}", e),
        })?;
        Ok(())
    }
}
