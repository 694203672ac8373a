//! Configuration for the loyalty engine.
//!
//! Supports loading from TOML file with CLI argument overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level runtime configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the external accrual service.
    pub accrual_url: String,
    /// Idle scan cadence of the scheduler.
    pub scan_interval: Duration,
    /// Pause between consecutive accrual requests.
    pub poll_interval: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Pause applied on 429 responses without a usable Retry-After header.
    pub rate_limit_fallback: Duration,
    pub log_level: String,
    pub health_log_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            accrual_url: "http://localhost:8080".to_string(),
            scan_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(1),
            rate_limit_fallback: Duration::from_secs(60),
            log_level: "info".to_string(),
            health_log_interval: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        Ok(Self::from(file))
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, accrual_url: Option<String>, log_level: Option<String>) {
        if let Some(url) = accrual_url {
            self.accrual_url = url;
        }
        if let Some(level) = log_level {
            self.log_level = level;
        }
    }
}

/// TOML file structure for deserialization.
#[derive(Debug, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    general: GeneralToml,
    #[serde(default)]
    accrual: AccrualToml,
    #[serde(default)]
    reconcile: ReconcileToml,
    #[serde(default)]
    health: HealthToml,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeneralToml {
    log_level: String,
}

impl Default for GeneralToml {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AccrualToml {
    url: String,
    request_timeout_ms: u64,
    rate_limit_fallback_secs: u64,
}

impl Default for AccrualToml {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            request_timeout_ms: 1000,
            rate_limit_fallback_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ReconcileToml {
    scan_interval_ms: u64,
    poll_interval_ms: u64,
}

impl Default for ReconcileToml {
    fn default() -> Self {
        Self {
            scan_interval_ms: 1000,
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct HealthToml {
    log_interval_secs: u64,
}

impl Default for HealthToml {
    fn default() -> Self {
        Self {
            log_interval_secs: 30,
        }
    }
}

impl From<TomlConfig> for EngineConfig {
    fn from(toml: TomlConfig) -> Self {
        Self {
            accrual_url: toml.accrual.url,
            scan_interval: Duration::from_millis(toml.reconcile.scan_interval_ms),
            poll_interval: Duration::from_millis(toml.reconcile.poll_interval_ms),
            request_timeout: Duration::from_millis(toml.accrual.request_timeout_ms),
            rate_limit_fallback: Duration::from_secs(toml.accrual.rate_limit_fallback_secs),
            log_level: toml.general.log_level,
            health_log_interval: Duration::from_secs(toml.health.log_interval_secs),
        }
    }
}
