//! Configuration - Engine Location and Session Timing
//!
//! Loaded once by the host at startup, then passed by reference.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
pub const API_BASE_URL_ENV: &str = "PBN_API_BASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid engine URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String { DEFAULT_API_BASE_URL.to_string() }
fn default_request_timeout_secs() -> u64 { 300 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl EngineConfig {
    /// `{base_url}/generate/`, tolerating a trailing slash on the base.
    pub fn generate_endpoint(&self) -> Result<Url, ConfigError> {
        let raw = format!("{}/generate/", self.base_url.trim_end_matches('/'));
        let url = Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        Ok(url)
    }
}

/// Notification and indicator timing, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default = "default_validation_ttl_ms")]
    pub validation_ttl_ms: u64,
    #[serde(default = "default_success_ttl_ms")]
    pub success_ttl_ms: u64,
    #[serde(default = "default_error_ttl_ms")]
    pub error_ttl_ms: u64,
    #[serde(default = "default_indicator_linger_ms")]
    pub indicator_linger_ms: u64,
}

fn default_validation_ttl_ms() -> u64 { 4000 }
fn default_success_ttl_ms() -> u64 { 4000 }
fn default_error_ttl_ms() -> u64 { 4500 }
fn default_indicator_linger_ms() -> u64 { 2000 }

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            validation_ttl_ms: default_validation_ttl_ms(),
            success_ttl_ms: default_success_ttl_ms(),
            error_ttl_ms: default_error_ttl_ms(),
            indicator_linger_ms: default_indicator_linger_ms(),
        }
    }
}

impl SessionConfig {
    pub fn validation_ttl(&self) -> Duration { Duration::from_millis(self.validation_ttl_ms) }
    pub fn success_ttl(&self) -> Duration { Duration::from_millis(self.success_ttl_ms) }
    pub fn error_ttl(&self) -> Duration { Duration::from_millis(self.error_ttl_ms) }
    pub fn indicator_linger(&self) -> Duration { Duration::from_millis(self.indicator_linger_ms) }
}

impl AppConfig {
    /// Read a JSON config file, or fall back to defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                serde_json::from_str(&content)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Result<Self, ConfigError> {
        if let Some(url) = base_url {
            self.engine.base_url = url;
            self.validate()?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.generate_endpoint()?;
        if self.engine.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("requestTimeoutSecs must be positive".into()));
        }
        let s = &self.session;
        if s.error_ttl_ms < s.success_ttl_ms {
            return Err(ConfigError::Invalid(
                "errorTtlMs must not be shorter than successTtlMs".into(),
            ));
        }
        Ok(())
    }
}
