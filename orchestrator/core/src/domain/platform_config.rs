// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Platform Configuration Types
//!
//! Defines the configuration schema for the agent manager, including:
//! - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
//! - Control-plane endpoint and retry budget
//! - Outbound HTTP retry window and per-attempt timeout
//! - Relational store connection and pool retry settings
//! - Logging level and format

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::retry::Backoff;

pub const API_VERSION: &str = "agent-manager.dev/v1";
pub const KIND: &str = "PlatformConfig";
pub const CONFIG_PATH_ENV: &str = "AGENT_MANAGER_CONFIG_PATH";

/// Top-level Kubernetes-style platform configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfigManifest {
    /// API version (must be "agent-manager.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "PlatformConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: PlatformConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable deployment name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfigSpec {
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,

    #[serde(default)]
    pub http: HttpClientConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneConfig {
    /// Base URL of the control-plane REST API
    #[serde(default = "default_control_plane_url")]
    pub url: String,

    /// Bearer token sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default)]
    pub retry: ControlPlaneRetryConfig,
}

/// Retry budget applied to every control-plane call made by the façade
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneRetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff; doubles on every further attempt
    #[serde(default = "default_control_plane_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<Duration>,
}

impl ControlPlaneRetryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::Exponential {
            base: self.base_delay,
            cap: self.max_delay,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpClientConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_wait_min", with = "humantime_serde")]
    pub wait_min: Duration,

    #[serde(default = "default_wait_max", with = "humantime_serde")]
    pub wait_max: Duration,

    /// Upper bound for a single attempt, including reading the body
    #[serde(default = "default_attempt_timeout", with = "humantime_serde")]
    pub attempt_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// PostgreSQL connection string; agent metadata is kept in memory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default)]
    pub retry: PoolRetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolBackoffStrategy {
    /// Same wait between every attempt
    Fixed,
    /// Wait grows by `backoff` after each failure
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolRetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_pool_backoff", with = "humantime_serde")]
    pub backoff: Duration,

    #[serde(default = "default_pool_strategy")]
    pub strategy: PoolBackoffStrategy,
}

impl PoolRetryConfig {
    pub fn backoff(&self) -> Backoff {
        match self.strategy {
            PoolBackoffStrategy::Fixed => Backoff::Fixed(self.backoff),
            PoolBackoffStrategy::Linear => Backoff::Linear { step: self.backoff },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_control_plane_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_control_plane_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_wait_min() -> Duration {
    Duration::from_secs(1)
}

fn default_wait_max() -> Duration {
    Duration::from_secs(10)
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(180)
}

fn default_max_connections() -> u32 {
    5
}

fn default_pool_backoff() -> Duration {
    Duration::from_millis(200)
}

fn default_pool_strategy() -> PoolBackoffStrategy {
    PoolBackoffStrategy::Fixed
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            url: default_control_plane_url(),
            token: None,
            retry: ControlPlaneRetryConfig::default(),
        }
    }
}

impl Default for ControlPlaneRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: default_control_plane_base_delay(),
            max_delay: None,
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            wait_min: default_wait_min(),
            wait_max: default_wait_max(),
            attempt_timeout: default_attempt_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            retry: PoolRetryConfig::default(),
        }
    }
}

impl Default for PoolRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff: default_pool_backoff(),
            strategy: default_pool_strategy(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for PlatformConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "agent-manager".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: PlatformConfigSpec::default(),
        }
    }
}

impl PlatformConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Candidate locations, in precedence order, after the explicit path
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from("./agent-manager.yaml"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".agent-manager").join("config.yaml"));
        }
        paths.push(PathBuf::from("/etc/agent-manager/config.yaml"));
        paths
    }

    /// First existing file among [`Self::search_paths`]
    pub fn discover_config() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|p| p.exists())
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("AGENT_MANAGER_CONTROL_PLANE_URL") {
            tracing::info!("Environment override: AGENT_MANAGER_CONTROL_PLANE_URL={}", url);
            self.spec.control_plane.url = url;
        }
        if let Some(token) = lookup("AGENT_MANAGER_CONTROL_PLANE_TOKEN") {
            tracing::info!("Environment override: AGENT_MANAGER_CONTROL_PLANE_TOKEN=<redacted>");
            self.spec.control_plane.token = Some(token);
        }
        if let Some(url) = lookup("AGENT_MANAGER_DATABASE_URL") {
            tracing::info!("Environment override: AGENT_MANAGER_DATABASE_URL=<redacted>");
            self.spec.database.url = Some(url);
        }
        if let Some(level) = lookup("AGENT_MANAGER_LOG_LEVEL") {
            tracing::info!("Environment override: AGENT_MANAGER_LOG_LEVEL={}", level);
            self.spec.logging.level = level;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.control_plane.url.is_empty() {
            anyhow::bail!("spec.controlPlane.url cannot be empty");
        }

        let http = &self.spec.http;
        if http.wait_min > http.wait_max {
            anyhow::bail!(
                "spec.http.waitMin ({:?}) must not exceed spec.http.waitMax ({:?})",
                http.wait_min,
                http.wait_max
            );
        }
        if http.attempt_timeout.is_zero() {
            anyhow::bail!("spec.http.attemptTimeout must be greater than zero");
        }

        if self.spec.database.max_connections == 0 {
            anyhow::bail!("spec.database.maxConnections must be at least 1");
        }

        match self.spec.logging.format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("Invalid spec.logging.format: '{}'. Must be 'text' or 'json'", other),
        }

        Ok(())
    }
}
