//! Configuration parsing and validation.
//!
//! sealkv configuration is loaded from TOML files. Sections mirror the
//! architectural components: node identity, lease defaults, and
//! telemetry.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level sealkv configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node identity configuration.
    #[serde(default)]
    pub node: NodeConfig,

    /// Lease defaults and constraints.
    #[serde(default)]
    pub lease: LeaseConfig,

    /// Telemetry and observability configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            lease: LeaseConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Node identity configuration.
///
/// The cluster and member identifiers are stamped into every response
/// header. They are opaque to clients; the substrate host would derive
/// them from its own identity in a full deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Cluster identifier.
    #[serde(default = "default_cluster_id")]
    pub cluster_id: u64,

    /// Member identifier within the cluster.
    #[serde(default = "default_member_id")]
    pub member_id: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            cluster_id: default_cluster_id(),
            member_id: default_member_id(),
        }
    }
}

/// Lease defaults and constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// TTL in seconds granted when a request asks for a non-positive TTL.
    #[serde(default = "default_lease_ttl_seconds")]
    pub default_ttl_seconds: i64,

    /// Maximum TTL in seconds a grant may request.
    #[serde(default = "default_lease_ttl_max_seconds")]
    pub max_ttl_seconds: i64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: default_lease_ttl_seconds(),
            max_ttl_seconds: default_lease_ttl_max_seconds(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_cluster_id() -> u64 {
    1
}

fn default_member_id() -> u64 {
    1
}

fn default_lease_ttl_seconds() -> i64 {
    60
}

fn default_lease_ttl_max_seconds() -> i64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_lease()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_lease(&self) -> Result<()> {
        if self.lease.default_ttl_seconds <= 0 {
            anyhow::bail!("lease.default_ttl_seconds must be > 0");
        }
        if self.lease.default_ttl_seconds > self.lease.max_ttl_seconds {
            anyhow::bail!(
                "lease.default_ttl_seconds ({}) cannot exceed lease.max_ttl_seconds ({})",
                self.lease.default_ttl_seconds,
                self.lease.max_ttl_seconds
            );
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}
