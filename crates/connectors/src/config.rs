//! Connector configuration types
//!
//! Configs are parsed from TOML. Credentials and host fall back to
//! environment variables when the file leaves them out.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConnectorError;
use crate::resilience::{
    DEFAULT_CAPPED_INTERVAL_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DURATION_SECS,
    DEFAULT_RETRY_INTERVAL_MS, RetryPolicy,
};

/// Default API host
pub const DEFAULT_HOST: &str = "https://pipes.turbot.com";

/// API path appended to the host
pub const API_PATH: &str = "/api/v0";

/// Environment variables checked for the token, in order
pub const TOKEN_ENV_VARS: &[&str] = &["STEAMPIPE_CLOUD_TOKEN", "PIPES_TOKEN"];

/// Environment variables checked for the host, in order
pub const HOST_ENV_VARS: &[&str] = &["STEAMPIPE_CLOUD_HOST", "PIPES_HOST"];

/// Pipes connector configuration
///
/// # Example
///
/// ```toml
/// token = "tpt_xxx"                   # optional, else STEAMPIPE_CLOUD_TOKEN / PIPES_TOKEN
/// host = "https://pipes.turbot.com"   # optional, else STEAMPIPE_CLOUD_HOST / PIPES_HOST
/// request_timeout_secs = 30
///
/// [retry]
/// interval_ms = 250
/// capped_interval_ms = 2000
/// max_attempts = 12
/// max_duration_secs = 30
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipesConfig {
    /// API token
    pub token: Option<String>,

    /// API host (scheme and authority, e.g. https://pipes.turbot.com)
    pub host: Option<String>,

    /// Per-request timeout in seconds (default: 30)
    pub request_timeout_secs: u64,

    /// Retry settings for every API call
    pub retry: RetrySettings,
}

impl Default for PipesConfig {
    fn default() -> Self {
        Self {
            token: None,
            host: None,
            request_timeout_secs: 30,
            retry: RetrySettings::default(),
        }
    }
}

impl PipesConfig {
    /// Parse config from raw TOML value
    pub fn from_toml(value: &toml::Value) -> Result<Self, ConnectorError> {
        let config: PipesConfig = value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| {
                ConnectorError::ConfigError(format!("Invalid Pipes config: {}", e))
            })?;
        Ok(config)
    }

    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConnectorError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let value: toml::Value = toml::from_str(&contents).map_err(|e| {
            ConnectorError::ConfigError(format!("failed to parse {}: {}", path.display(), e))
        })?;
        Self::from_toml(&value)
    }

    /// Resolve the API token from config, then the process environment
    pub fn resolve_token(&self) -> Result<String, ConnectorError> {
        self.resolve_token_with(|name| std::env::var(name).ok())
    }

    /// Resolve the API token using `env` for variable lookups
    pub fn resolve_token_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConnectorError> {
        first_non_empty(self.token.as_deref(), TOKEN_ENV_VARS, &env).ok_or_else(|| {
            ConnectorError::ConfigError(
                "'token' must be set in the connection configuration or via STEAMPIPE_CLOUD_TOKEN / PIPES_TOKEN"
                    .to_string(),
            )
        })
    }

    /// API base URL from config, then the process environment, then the default host
    pub fn api_base_url(&self) -> Result<String, ConnectorError> {
        self.api_base_url_with(|name| std::env::var(name).ok())
    }

    /// API base URL using `env` for variable lookups
    pub fn api_base_url_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConnectorError> {
        let host = first_non_empty(self.host.as_deref(), HOST_ENV_VARS, &env)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let url = reqwest::Url::parse(&host)
            .map_err(|e| ConnectorError::ConfigError(format!("invalid host {}: {}", host, e)))?;
        let Some(authority) = url.host_str() else {
            return Err(ConnectorError::ConfigError(format!(
                "missing protocol or host: {}",
                host
            )));
        };

        Ok(match url.port() {
            Some(port) => format!("{}://{}:{}{}", url.scheme(), authority, port, API_PATH),
            None => format!("{}://{}{}", url.scheme(), authority, API_PATH),
        })
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Build the retry policy from these settings
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConnectorError> {
        self.retry.to_policy()
    }
}

fn first_non_empty(
    configured: Option<&str>,
    vars: &[&str],
    env: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    configured
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| vars.iter().find_map(|name| env(name).filter(|v| !v.is_empty())))
}

/// Retry settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Delay before the first retry in milliseconds (default: 250)
    pub interval_ms: u64,
    /// Ceiling for a single delay in milliseconds (default: 2000)
    pub capped_interval_ms: u64,
    /// Backoff multiplier (default: 2)
    pub multiplier: u32,
    /// Maximum attempts including the first (default: 12)
    pub max_attempts: u32,
    /// Wall-clock budget for one call in seconds (default: 30)
    pub max_duration_secs: u64,
    /// Spread delays by ±25% (default: false)
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            capped_interval_ms: DEFAULT_CAPPED_INTERVAL_MS,
            multiplier: 2,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            jitter: false,
        }
    }
}

impl RetrySettings {
    /// Validate and build a retry policy
    pub fn to_policy(&self) -> Result<RetryPolicy, ConnectorError> {
        if self.max_attempts == 0 {
            return Err(ConnectorError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.multiplier == 0 {
            return Err(ConnectorError::ConfigError(
                "retry.multiplier must be at least 1".to_string(),
            ));
        }
        if self.interval_ms > self.capped_interval_ms {
            return Err(ConnectorError::ConfigError(format!(
                "retry.interval_ms ({}) must be <= retry.capped_interval_ms ({})",
                self.interval_ms, self.capped_interval_ms
            )));
        }

        Ok(RetryPolicy::new(
            Duration::from_millis(self.interval_ms),
            Duration::from_millis(self.capped_interval_ms),
            self.max_attempts,
            Duration::from_secs(self.max_duration_secs),
        )
        .with_multiplier(self.multiplier)
        .with_jitter(self.jitter))
    }
}
