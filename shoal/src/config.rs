//! Client configuration

use crate::address::Seeds;
use crate::error::{Result, ShoalError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Replica-set members, `"host:port"` or a list of them
    #[serde(default)]
    pub seeds: Seeds,

    /// Logical database name
    #[serde(default = "default_db_name")]
    pub db_name: String,

    /// Interval between health refresh passes in milliseconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,

    /// Timeout for a single ismaster probe in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// How long command routing waits for a matching node in milliseconds
    #[serde(default = "default_selection_timeout")]
    pub selection_timeout_ms: u64,

    /// Delay between node selection attempts in milliseconds
    #[serde(default = "default_selection_retry_interval")]
    pub selection_retry_interval_ms: u64,

    /// Per-node connection pool settings
    #[serde(default)]
    pub pool: PoolConfig,
}

fn default_db_name() -> String {
    "test".to_string()
}

fn default_refresh_interval() -> u64 {
    10_000
}

fn default_probe_timeout() -> u64 {
    5000
}

fn default_selection_timeout() -> u64 {
    30_000
}

fn default_selection_retry_interval() -> u64 {
    50
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            seeds: Seeds::default(),
            db_name: default_db_name(),
            refresh_interval_ms: default_refresh_interval(),
            probe_timeout_ms: default_probe_timeout(),
            selection_timeout_ms: default_selection_timeout(),
            selection_retry_interval_ms: default_selection_retry_interval(),
            pool: PoolConfig::default(),
        }
    }
}

/// Connection pool configuration for one node
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Maximum connections checked out or idle at once
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum time to wait for a free connection in milliseconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,
}

fn default_max_connections() -> usize {
    10
}

fn default_acquire_timeout() -> u64 {
    30_000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout(),
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(ShoalError::Config("pool.max_connections must be > 0".into()));
        }
        Ok(())
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShoalError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make the client unusable
    pub fn validate(&self) -> Result<()> {
        if self.db_name.is_empty() {
            return Err(ShoalError::Config("db_name must not be empty".into()));
        }
        if self.refresh_interval_ms == 0 {
            return Err(ShoalError::Config("refresh_interval_ms must be > 0".into()));
        }
        if self.probe_timeout_ms == 0 {
            return Err(ShoalError::Config("probe_timeout_ms must be > 0".into()));
        }
        if self.selection_retry_interval_ms == 0 {
            return Err(ShoalError::Config(
                "selection_retry_interval_ms must be > 0".into(),
            ));
        }
        self.pool.validate()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn selection_timeout(&self) -> Duration {
        Duration::from_millis(self.selection_timeout_ms)
    }

    pub fn selection_retry_interval(&self) -> Duration {
        Duration::from_millis(self.selection_retry_interval_ms)
    }
}
