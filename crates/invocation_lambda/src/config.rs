use std::time::Duration;

use invocation_core::orchestrator::{DEFAULT_TIMEOUT, DEFAULT_TIMEOUT_OFFSET};
use invocation_core::{ExecutionConfig, PayloadRule};
use thiserror::Error;

pub const DEFAULT_PARTITION_KEY_ATTRIBUTE: &str = "pk";
pub const DEFAULT_SORT_KEY_ATTRIBUTE: &str = "sk";
pub const DEFAULT_PROBE_URL: &str = "http://checkip.amazonaws.com/";
pub const DEFAULT_OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a whole number of milliseconds, got `{value}`")]
    InvalidMillis { name: &'static str, value: String },
    #[error("REQUIRED_PAYLOAD_KEYS must be a JSON array of rules: {0}")]
    InvalidRules(#[source] serde_json::Error),
    #[error("{0} cannot be empty")]
    Empty(&'static str),
    #[error("failed to build outbound http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Process configuration read once at cold start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub execution: ExecutionConfig,
    pub partition_key_attribute: String,
    pub sort_key_attribute: String,
    pub preload_secrets: Vec<String>,
    pub probe_url: String,
    pub outbound_timeout: Duration,
}

impl RuntimeSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let millis = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(name) {
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| ConfigError::InvalidMillis { name, value }),
                None => Ok(default),
            }
        };
        let non_empty = |name: &'static str, default: &str| -> Result<String, ConfigError> {
            let value = lookup(name).unwrap_or_else(|| default.to_string());
            if value.trim().is_empty() {
                return Err(ConfigError::Empty(name));
            }
            Ok(value.trim().to_string())
        };

        let required_payload_keys = match lookup("REQUIRED_PAYLOAD_KEYS") {
            Some(raw) if !raw.trim().is_empty() => {
                serde_json::from_str::<Vec<PayloadRule>>(&raw).map_err(ConfigError::InvalidRules)?
            }
            _ => Vec::new(),
        };

        let preload_secrets = lookup("PRELOAD_SECRETS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            execution: ExecutionConfig {
                timeout: millis("FUNCTION_TIMEOUT_MS", DEFAULT_TIMEOUT)?,
                timeout_offset: millis("TIMEOUT_OFFSET_MS", DEFAULT_TIMEOUT_OFFSET)?,
                required_payload_keys,
            },
            partition_key_attribute: non_empty(
                "TABLE_PARTITION_KEY_ATTRIBUTE",
                DEFAULT_PARTITION_KEY_ATTRIBUTE,
            )?,
            sort_key_attribute: non_empty("TABLE_SORT_KEY_ATTRIBUTE", DEFAULT_SORT_KEY_ATTRIBUTE)?,
            preload_secrets,
            probe_url: non_empty("OUTBOUND_PROBE_URL", DEFAULT_PROBE_URL)?,
            outbound_timeout: millis("OUTBOUND_TIMEOUT_MS", DEFAULT_OUTBOUND_TIMEOUT)?,
        })
    }
}
