// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Swarm Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) carrying the
// tunables of the coordination layer:
// - Router delivery policy (timeout, retries, linear backoff)
// - Stage executor deadlines and designated capabilities
// - Execution store retention (TTL, capacity, sweep cadence)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "SwarmConfig";
pub const CONFIG_PATH_ENV: &str = "AEGIS_SWARM_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "./aegis-swarm.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level Kubernetes-style swarm configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "SwarmConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: SwarmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Coordination layer configuration (content under spec:)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub store: StoreConfig,

    /// Events buffered per subscriber before the oldest are dropped
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            executor: ExecutorConfig::default(),
            store: StoreConfig::default(),
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Retry attempts after the first failed delivery
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before retry N is `backoff_base_ms * N`
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Per-attempt delivery deadline
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RouterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_planning_timeout_ms")]
    pub planning_timeout_ms: u64,

    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,

    #[serde(default = "default_synthesis_timeout_ms")]
    pub synthesis_timeout_ms: u64,

    /// Capability the planning agent advertises
    #[serde(default = "default_planning_capability")]
    pub planning_capability: String,

    /// Capability the synthesis agent advertises
    #[serde(default = "default_synthesis_capability")]
    pub synthesis_capability: String,

    /// Sender id stamped on every pipeline envelope
    #[serde(default = "default_executor_id")]
    pub executor_id: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            planning_timeout_ms: default_planning_timeout_ms(),
            execution_timeout_ms: default_execution_timeout_ms(),
            synthesis_timeout_ms: default_synthesis_timeout_ms(),
            planning_capability: default_planning_capability(),
            synthesis_capability: default_synthesis_capability(),
            executor_id: default_executor_id(),
        }
    }
}

impl ExecutorConfig {
    pub fn planning_timeout(&self) -> Duration {
        Duration::from_millis(self.planning_timeout_ms)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Age after which a stored execution is evictable
    #[serde(default = "default_execution_ttl_ms")]
    pub execution_ttl_ms: u64,

    /// Hard cap on stored executions after a sweep
    #[serde(default = "default_max_executions")]
    pub max_executions: usize,

    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            execution_ttl_ms: default_execution_ttl_ms(),
            max_executions: default_max_executions(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl StoreConfig {
    pub fn execution_ttl(&self) -> Duration {
        Duration::from_millis(self.execution_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

fn default_event_bus_capacity() -> usize {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_planning_timeout_ms() -> u64 {
    60_000
}

fn default_execution_timeout_ms() -> u64 {
    120_000
}

fn default_synthesis_timeout_ms() -> u64 {
    60_000
}

fn default_planning_capability() -> String {
    "planning".to_string()
}

fn default_synthesis_capability() -> String {
    "synthesis".to_string()
}

fn default_executor_id() -> String {
    "stage-executor".to_string()
}

fn default_execution_ttl_ms() -> u64 {
    3_600_000
}

fn default_max_executions() -> usize {
    1000
}

fn default_sweep_interval_ms() -> u64 {
    300_000
}

impl Default for SwarmConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "default".to_string(),
                labels: None,
            },
            spec: SwarmConfig::default(),
        }
    }
}

impl SwarmConfigManifest {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let manifest: Self = serde_yaml::from_str(yaml)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file path (env var, then working directory)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from(DEFAULT_CONFIG_FILE);
        if cwd.exists() {
            return Some(cwd);
        }

        None
    }

    /// Load from an explicit path (must exist), a discovered path, or defaults.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut manifest = if let Some(path) = cli_path {
            tracing::info!("Loading swarm configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading swarm configuration from discovered path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else {
            tracing::debug!("No swarm configuration file found, using defaults");
            Self::default()
        };

        manifest.spec.apply_env_overrides();
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::Invalid(format!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version, API_VERSION
            )));
        }

        if self.kind != KIND {
            return Err(ConfigError::Invalid(format!(
                "Invalid kind: '{}'. Must be '{}'",
                self.kind, KIND
            )));
        }

        if self.metadata.name.is_empty() {
            return Err(ConfigError::Invalid("metadata.name cannot be empty".to_string()));
        }

        self.spec.validate()
    }
}

impl SwarmConfig {
    /// Apply environment variable overrides on top of the loaded file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AEGIS_SWARM_MAX_RETRIES") {
            match val.parse::<u32>() {
                Ok(n) => self.router.max_retries = n,
                Err(_) => tracing::warn!("Ignoring invalid AEGIS_SWARM_MAX_RETRIES value: {}", val),
            }
        }

        if let Ok(val) = std::env::var("AEGIS_SWARM_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => self.router.timeout_ms = ms,
                Err(_) => tracing::warn!("Ignoring invalid AEGIS_SWARM_TIMEOUT_MS value: {}", val),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("router.timeout_ms", self.router.timeout_ms),
            ("executor.planning_timeout_ms", self.executor.planning_timeout_ms),
            ("executor.execution_timeout_ms", self.executor.execution_timeout_ms),
            ("executor.synthesis_timeout_ms", self.executor.synthesis_timeout_ms),
            ("store.sweep_interval_ms", self.store.sweep_interval_ms),
        ];
        for (key, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than zero", key)));
            }
        }

        if self.store.max_executions == 0 {
            return Err(ConfigError::Invalid(
                "store.max_executions must be greater than zero".to_string(),
            ));
        }

        if self.event_bus_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_bus_capacity must be greater than zero".to_string(),
            ));
        }

        if self.executor.planning_capability.is_empty() || self.executor.synthesis_capability.is_empty() {
            return Err(ConfigError::Invalid(
                "executor capabilities cannot be empty".to_string(),
            ));
        }

        if self.executor.executor_id.is_empty() {
            return Err(ConfigError::Invalid("executor.executor_id cannot be empty".to_string()));
        }

        Ok(())
    }
}
