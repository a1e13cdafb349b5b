// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0

// Scope Configuration Types
//
// Defines the configuration schema for a scopekeeper runtime:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Runtime identity within its cluster zone
// - Conversational reaper scheduling and default idle timeout
// - Instantiation barrier wait bounds and timeout recovery policy
// - Cluster zone membership for domain scope

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "scopekeeper/v1";
pub const KIND: &str = "ScopeConfig";

/// Top-level Kubernetes-style scope configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfigManifest {
    /// API version (must be "scopekeeper/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ScopeConfig")
    pub kind: String,

    /// Manifest metadata (name, labels)
    pub metadata: ManifestMetadata,

    /// Scope configuration specification
    pub spec: ScopeConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable configuration name
    pub name: String,

    /// Optional: Labels for categorization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Scope configuration specification (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfigSpec {
    /// Identity of the local runtime (unique within its zone)
    pub runtime_name: String,

    /// Conversational scope settings
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Instantiation barrier settings
    #[serde(default)]
    pub instantiation: InstantiationConfig,

    /// Cluster settings; when present, domain scope waits for zone leadership
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Period of the expiration reaper in seconds
    /// Default: 600
    #[serde(default = "default_reaper_period")]
    pub reaper_period_seconds: u64,

    /// Idle timeout applied by callers that start conversations without an
    /// explicit policy (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_idle_timeout_seconds: Option<u64>,
}

impl ConversationConfig {
    pub fn reaper_period(&self) -> Duration {
        Duration::from_secs(self.reaper_period_seconds)
    }

    pub fn default_idle_timeout(&self) -> Option<Duration> {
        self.default_idle_timeout_seconds.map(Duration::from_secs)
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            reaper_period_seconds: default_reaper_period(),
            default_idle_timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantiationConfig {
    /// How long a caller waits for a concurrent instantiation, in seconds
    /// Default: 300
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_seconds: u64,

    /// What a waiter does when the wait times out
    #[serde(default)]
    pub on_timeout: TimeoutAction,

    /// Number of additional waits when `on_timeout` is `retry`
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

impl InstantiationConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_seconds)
    }

    pub fn timeout_policy(&self) -> WaitTimeoutPolicy {
        match self.on_timeout {
            TimeoutAction::Fail => WaitTimeoutPolicy::Fail,
            TimeoutAction::Retry => WaitTimeoutPolicy::Retry {
                attempts: self.retry_attempts,
            },
        }
    }
}

impl Default for InstantiationConfig {
    fn default() -> Self {
        Self {
            wait_timeout_seconds: default_wait_timeout(),
            on_timeout: TimeoutAction::default(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutAction {
    #[default]
    Fail,
    Retry,
}

/// Recovery semantics for a caller whose wait on an in-flight
/// instantiation timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeoutPolicy {
    /// Surface `InstantiationTimeout` immediately.
    Fail,
    /// Wait again up to `attempts` more times before failing.
    Retry { attempts: u32 },
}

impl Default for WaitTimeoutPolicy {
    fn default() -> Self {
        Self::Fail
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Zone the local runtime participates in
    #[serde(default = "default_zone")]
    pub zone: String,
}

// Default value functions
fn default_reaper_period() -> u64 {
    600
}

fn default_wait_timeout() -> u64 {
    300
}

fn default_retry_attempts() -> u32 {
    1
}

fn default_zone() -> String {
    "default".to_string()
}

impl Default for ScopeConfigSpec {
    fn default() -> Self {
        Self {
            runtime_name: "runtime-1".to_string(),
            conversation: ConversationConfig::default(),
            instantiation: InstantiationConfig::default(),
            cluster: None,
        }
    }
}

impl Default for ScopeConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "scopekeeper".to_string(),
                labels: None,
            },
            spec: ScopeConfigSpec::default(),
        }
    }
}

impl ScopeConfigManifest {
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

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SCOPEKEEPER_CONFIG_PATH environment variable
    /// 2. ./scopekeeper-config.yaml (working directory)
    /// 3. ~/.scopekeeper/config.yaml (user home)
    /// 4. /etc/scopekeeper/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SCOPEKEEPER_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./scopekeeper-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".scopekeeper").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/scopekeeper/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing/invalid
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
        if let Ok(val) = std::env::var("SCOPEKEEPER_REAPER_PERIOD_SECONDS") {
            match val.parse::<u64>() {
                Ok(seconds) => {
                    tracing::info!("Environment override: SCOPEKEEPER_REAPER_PERIOD_SECONDS={}", seconds);
                    self.spec.conversation.reaper_period_seconds = seconds;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for SCOPEKEEPER_REAPER_PERIOD_SECONDS: '{}'. Expected seconds. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.runtime_name.is_empty() {
            anyhow::bail!("spec.runtime_name cannot be empty");
        }

        if self.spec.conversation.reaper_period_seconds == 0 {
            anyhow::bail!("spec.conversation.reaper_period_seconds must be greater than zero");
        }

        if self.spec.conversation.default_idle_timeout_seconds == Some(0) {
            anyhow::bail!("spec.conversation.default_idle_timeout_seconds must be greater than zero");
        }

        if self.spec.instantiation.wait_timeout_seconds == 0 {
            anyhow::bail!("spec.instantiation.wait_timeout_seconds must be greater than zero");
        }

        if self.spec.instantiation.on_timeout == TimeoutAction::Retry
            && self.spec.instantiation.retry_attempts == 0
        {
            anyhow::bail!("spec.instantiation.retry_attempts must be at least 1 when on_timeout is 'retry'");
        }

        if let Some(cluster) = &self.spec.cluster {
            if cluster.zone.is_empty() {
                anyhow::bail!("spec.cluster.zone cannot be empty");
            }
        }

        Ok(())
    }
}
