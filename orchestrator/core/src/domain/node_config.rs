// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the configuration schema shared by Ironworks agents and servers:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Node identity
// - Container runtime settings for the agent
// - Transport settings (server endpoint, publish retry)
// - Server settings (gRPC bind address, database)
// - Observability settings

use crate::domain::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "ironworks.dev/v1";
pub const KIND: &str = "NodeConfig";

/// Top-level Kubernetes-style node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigManifest {
    /// API version (must be "ironworks.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "NodeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: NodeConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigSpec {
    pub node: NodeIdentity,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Worker id; actions whose owner matches it run on this node
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path to Docker socket
    /// Default: the bollard local defaults (DOCKER_HOST or /var/run/docker.sock)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_socket_path: Option<String>,

    /// Parent directory for per-action failure files
    /// Default: the system temp directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_files_dir: Option<String>,

    #[serde(default = "default_max_attempts")]
    pub pull_max_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub pull_retry_delay_ms: u64,

    /// Grace period given to a container on cancellation before it is killed
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_seconds: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_socket_path: None,
            failure_files_dir: None,
            pull_max_attempts: default_max_attempts(),
            pull_retry_delay_ms: default_retry_delay(),
            stop_timeout_seconds: default_stop_timeout(),
        }
    }
}

impl RuntimeConfig {
    pub fn pull_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.pull_max_attempts,
            base_delay_ms: self.pull_retry_delay_ms,
            max_delay_ms: default_max_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// gRPC endpoint of the server (agent side)
    #[serde(default = "default_server_endpoint")]
    pub server_endpoint: String,

    #[serde(default = "default_max_attempts")]
    pub publish_max_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub publish_retry_delay_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            server_endpoint: default_server_endpoint(),
            publish_max_attempts: default_max_attempts(),
            publish_retry_delay_ms: default_retry_delay(),
        }
    }
}

impl TransportConfig {
    pub fn publish_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.publish_max_attempts,
            base_delay_ms: self.publish_retry_delay_ms,
            max_delay_ms: default_max_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Network bind address (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,

    /// PostgreSQL connection string; in-memory storage when unset
    /// Supports "env:VAR_NAME"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            grpc_port: default_grpc_port(),
            database_url: None,
        }
    }
}

impl ServerConfig {
    /// Database URL with an `env:` reference resolved.
    pub fn resolved_database_url(&self) -> anyhow::Result<Option<String>> {
        match self.database_url.as_deref() {
            None => Ok(None),
            Some(url) => match url.strip_prefix("env:") {
                Some(var) => std::env::var(var)
                    .map(Some)
                    .map_err(|_| anyhow::anyhow!("database_url references unset variable {}", var)),
                None => Ok(Some(url.to_string())),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus exporter port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_server_endpoint() -> String {
    "http://127.0.0.1:42113".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_grpc_port() -> u16 {
    42113
}

impl Default for NodeConfigSpec {
    fn default() -> Self {
        Self {
            node: NodeIdentity {
                id: uuid::Uuid::new_v4().to_string(),
            },
            runtime: RuntimeConfig::default(),
            transport: TransportConfig::default(),
            server: ServerConfig::default(),
            observability: None,
        }
    }
}

impl Default for NodeConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "ironworks-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: NodeConfigSpec::default(),
        }
    }
}

impl NodeConfigManifest {
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

    /// Discover configuration file using precedence order
    /// 1. IRONWORKS_CONFIG_PATH environment variable
    /// 2. ./ironworks-config.yaml (working directory)
    /// 3. ~/.ironworks/config.yaml (user home)
    /// 4. /etc/ironworks/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("IRONWORKS_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./ironworks-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".ironworks").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/ironworks/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("IRONWORKS_NODE_ID") {
            tracing::info!("Environment override: IRONWORKS_NODE_ID={}", val);
            self.spec.node.id = val;
        }

        if let Some(val) = lookup("IRONWORKS_SERVER_ENDPOINT") {
            tracing::info!("Environment override: IRONWORKS_SERVER_ENDPOINT={}", val);
            self.spec.transport.server_endpoint = val;
        }

        if let Some(val) = lookup("IRONWORKS_DOCKER_SOCKET") {
            tracing::info!("Environment override: IRONWORKS_DOCKER_SOCKET={}", val);
            self.spec.runtime.docker_socket_path = Some(val);
        }

        if let Some(val) = lookup("IRONWORKS_DATABASE_URL") {
            tracing::info!("Environment override: IRONWORKS_DATABASE_URL set");
            self.spec.server.database_url = Some(val);
        }

        if let Some(val) = lookup("IRONWORKS_GRPC_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: IRONWORKS_GRPC_PORT={}", port);
                    self.spec.server.grpc_port = port;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for IRONWORKS_GRPC_PORT: '{}'. Expected a port number. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
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

        if self.spec.node.id.is_empty() {
            anyhow::bail!("spec.node.id cannot be empty");
        }

        if self.spec.runtime.pull_max_attempts == 0 {
            anyhow::bail!("spec.runtime.pull_max_attempts must be at least 1");
        }

        if self.spec.transport.publish_max_attempts == 0 {
            anyhow::bail!("spec.transport.publish_max_attempts must be at least 1");
        }

        if self.spec.transport.server_endpoint.is_empty() {
            anyhow::bail!("spec.transport.server_endpoint cannot be empty");
        }

        if let Some(logging) = self
            .spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.as_ref())
        {
            if logging.format != "json" && logging.format != "text" {
                anyhow::bail!(
                    "Invalid logging format: '{}'. Must be 'json' or 'text'",
                    logging.format
                );
            }
        }

        Ok(())
    }
}
