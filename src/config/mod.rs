//! Configuration management for localchat-rs
//!
//! The adapter is configured once at startup from, in increasing priority:
//! 1. Built-in defaults
//! 2. Config file (`<config dir>/localchat/config.json`)
//! 3. Environment variables (`OLLAMA_HOST`, `LOCALCHAT_MODEL`, `LOCALCHAT_TIMEOUT_SECS`)
//! 4. CLI parameters
//!
//! The resulting [`AdapterConfig`] is immutable and shared by every request.

pub mod models;
pub mod settings;

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

pub use self::models::ModelRef;
use crate::error::{ChatError, Result};
use crate::services::GenerationOptions;

/// Default address of a locally installed Ollama daemon
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default model used when a request does not name one
pub const DEFAULT_MODEL: &str = "qwen3:0.6b";

/// Default total request timeout in seconds
///
/// Raw prompts without a stop sequence can keep a small model generating for
/// several minutes, so this is deliberately generous.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default TCP connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Process-wide adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Base URL of the inference daemon
    pub base_url: String,

    /// Model used when a request leaves `model` empty
    pub default_model: String,

    /// Total request timeout, including reading the body
    pub timeout_secs: u64,

    /// TCP connect timeout
    pub connect_timeout_secs: u64,

    /// Whether `stream=true` requests are accepted
    pub allow_streaming: bool,

    /// Generation options applied when a request sets none of its own
    pub options: GenerationOptions,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            allow_streaming: true,
            options: GenerationOptions::default(),
        }
    }
}

impl AdapterConfig {
    /// Load configuration from the default file and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or the
    /// result does not validate
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_path(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path
    #[must_use]
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("localchat")
    }

    /// Get the config file path
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Apply environment overrides through `lookup`
    ///
    /// # Errors
    ///
    /// Returns an error if `LOCALCHAT_TIMEOUT_SECS` is not a number
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OLLAMA_HOST").filter(|h| !h.trim().is_empty()) {
            self.base_url = normalize_host(&host);
        }

        if let Some(model) = lookup("LOCALCHAT_MODEL").filter(|m| !m.trim().is_empty()) {
            self.default_model = model.trim().to_string();
        }

        if let Some(timeout) = lookup("LOCALCHAT_TIMEOUT_SECS") {
            self.timeout_secs = timeout.trim().parse().map_err(|_| {
                ChatError::ConfigValidation(format!(
                    "LOCALCHAT_TIMEOUT_SECS must be a number of seconds, got `{timeout}`"
                ))
            })?;
        }

        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not an http(s) URL or a timeout is zero
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            ChatError::ConfigValidation(format!("invalid base_url `{}`: {e}", self.base_url))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ChatError::ConfigValidation(format!(
                "base_url must use http or https, got `{}`",
                url.scheme()
            )));
        }

        if self.timeout_secs == 0 {
            return Err(ChatError::ConfigValidation(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(ChatError::ConfigValidation(
                "connect_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if !self.default_model.is_empty() {
            ModelRef::parse(&self.default_model)?;
        }

        Ok(())
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Full URL for an API path such as `/api/chat`
    #[must_use]
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

/// Turn an `OLLAMA_HOST` style value into a base URL
///
/// `0.0.0.0:11434` becomes `http://0.0.0.0:11434`; explicit schemes are kept.
#[must_use]
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}
