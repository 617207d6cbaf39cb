//! Provider configuration

use std::time::Duration;

use armature_client::PollPolicy;
use serde::Deserialize;

/// Default ARM endpoint (public cloud)
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// Default Microsoft.Network API version
pub const DEFAULT_API_VERSION: &str = "2023-09-01";

/// Configuration for the Azure provider
#[derive(Debug, Clone, Deserialize)]
pub struct AzureConfig {
    /// ARM endpoint; override for sovereign clouds or test servers
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub subscription_id: String,
    pub resource_group: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub timeouts: OperationTimeouts,
    #[serde(default)]
    pub polling: PollingConfig,
}

impl AzureConfig {
    pub fn new(subscription_id: impl Into<String>, resource_group: impl Into<String>) -> Self {
        Self {
            endpoint: default_endpoint(),
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            api_version: default_api_version(),
            timeouts: OperationTimeouts::default(),
            polling: PollingConfig::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

/// Per-operation overall timeouts, in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct OperationTimeouts {
    #[serde(default = "default_mutate_secs")]
    pub create_secs: u64,
    #[serde(default = "default_mutate_secs")]
    pub update_secs: u64,
    #[serde(default = "default_mutate_secs")]
    pub delete_secs: u64,
    #[serde(default = "default_read_secs")]
    pub read_secs: u64,
}

impl OperationTimeouts {
    pub fn create(&self) -> Duration {
        Duration::from_secs(self.create_secs)
    }

    pub fn update(&self) -> Duration {
        Duration::from_secs(self.update_secs)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            create_secs: default_mutate_secs(),
            update_secs: default_mutate_secs(),
            delete_secs: default_mutate_secs(),
            read_secs: default_read_secs(),
        }
    }
}

/// 30 minutes for mutations
fn default_mutate_secs() -> u64 {
    1800
}

/// 5 minutes for reads
fn default_read_secs() -> u64 {
    300
}

/// Backoff configuration for operation polling
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_max_transient_retries")]
    pub max_transient_retries: u32,
}

impl PollingConfig {
    /// Build a poll policy bounded by the given overall timeout
    pub fn policy(&self, max_elapsed: Duration) -> PollPolicy {
        PollPolicy {
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            multiplier: self.multiplier,
            max_interval: Duration::from_millis(self.max_interval_ms),
            max_elapsed: Some(max_elapsed),
            max_transient_retries: self.max_transient_retries,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            multiplier: default_multiplier(),
            max_interval_ms: default_max_interval_ms(),
            max_transient_retries: default_max_transient_retries(),
        }
    }
}

fn default_initial_interval_ms() -> u64 {
    5_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_interval_ms() -> u64 {
    60_000
}

fn default_max_transient_retries() -> u32 {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_deserializes_with_defaults() {
        let config: AzureConfig = serde_json::from_value(serde_json::json!({
            "subscription_id": "sub-1",
            "resource_group": "rg-1"
        }))
        .unwrap();

        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.timeouts.create(), Duration::from_secs(1800));
        assert_eq!(config.timeouts.read(), Duration::from_secs(300));
    }

    #[test]
    fn polling_config_builds_policy() {
        let config = PollingConfig::default();
        let policy = config.policy(Duration::from_secs(60));
        assert_eq!(policy.initial_interval, Duration::from_secs(5));
        assert_eq!(policy.max_elapsed, Some(Duration::from_secs(60)));
    }
}
