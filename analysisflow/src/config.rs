//! Configuration for the orchestrator and its backend client.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. Environment variables override file or default values.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::errors::{AnalysisError, Result};

/// Environment variable overriding [`BackendConfig::base_url`].
pub const ENV_BACKEND_URL: &str = "ANALYSISFLOW_BACKEND_URL";
/// Environment variable overriding [`BackendConfig::request_timeout_seconds`].
pub const ENV_REQUEST_TIMEOUT: &str = "ANALYSISFLOW_REQUEST_TIMEOUT_SECS";
/// Environment variable overriding [`PollConfig::interval_ms`].
pub const ENV_POLL_INTERVAL: &str = "ANALYSISFLOW_POLL_INTERVAL_MS";
/// Environment variable overriding [`PollConfig::max_attempts`].
pub const ENV_POLL_MAX_ATTEMPTS: &str = "ANALYSISFLOW_POLL_MAX_ATTEMPTS";

/// Configuration for the HTTP backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the analysis backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: f64,
    /// Additional headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_request_timeout() -> f64 {
    300.0
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout(),
            headers: HashMap::new(),
        }
    }
}

impl BackendConfig {
    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Gets the request timeout as a Duration.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::Config` if the timeout is not a positive
    /// number of seconds that fits in a `Duration`.
    pub fn request_timeout(&self) -> Result<Duration> {
        let seconds = self.request_timeout_seconds;
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(AnalysisError::Config(
                "backend.request_timeout_seconds must be a positive finite number".into(),
            ));
        }
        Duration::try_from_secs_f64(seconds).map_err(|e| {
            AnalysisError::Config(format!("backend.request_timeout_seconds out of range: {e}"))
        })
    }
}

/// Bounded polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay before each poll, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    /// Maximum number of polls before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    30
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PollConfig {
    /// Creates a poll configuration.
    #[must_use]
    pub const fn new(interval_ms: u64, max_attempts: u32) -> Self {
        Self {
            interval_ms,
            max_attempts,
        }
    }

    /// Gets the interval as a Duration.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// What a stage's process request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadMode {
    /// An empty payload; the backend works from the submitted context.
    #[default]
    ContextOnly,
    /// The formatted results of the stage's upstream stages.
    WithUpstream,
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Backend connection settings.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Polling settings.
    #[serde(default)]
    pub polling: PollConfig,
    /// Process payload construction.
    #[serde(default)]
    pub payload_mode: PayloadMode,
    /// Whether the next stage's process call may overlap the current
    /// stage's formatting or polling.
    #[serde(default = "default_overlap")]
    pub overlap: bool,
}

fn default_overlap() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            polling: PollConfig::default(),
            payload_mode: PayloadMode::default(),
            overlap: default_overlap(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the polling parameters.
    #[must_use]
    pub const fn with_polling(mut self, polling: PollConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Sets the payload mode.
    #[must_use]
    pub const fn with_payload_mode(mut self, mode: PayloadMode) -> Self {
        self.payload_mode = mode;
        self
    }

    /// Enables or disables overlap.
    #[must_use]
    pub const fn with_overlap(mut self, overlap: bool) -> Self {
        self.overlap = overlap;
        self
    }

    /// Sets the backend configuration.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    /// Parses a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AnalysisError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AnalysisError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Builds a configuration from defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        Self::new().apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from a key lookup (normally the process environment).
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BACKEND_URL) {
            self.backend.base_url = url;
        }
        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT) {
            self.backend.request_timeout_seconds = parse_env(ENV_REQUEST_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL) {
            self.polling.interval_ms = parse_env(ENV_POLL_INTERVAL, &value)?;
        }
        if let Some(value) = lookup(ENV_POLL_MAX_ATTEMPTS) {
            self.polling.max_attempts = parse_env(ENV_POLL_MAX_ATTEMPTS, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(AnalysisError::Config("backend.base_url must not be empty".into()));
        }
        self.backend.request_timeout()?;
        if self.polling.interval_ms == 0 {
            return Err(AnalysisError::Config("polling.interval_ms must be positive".into()));
        }
        if self.polling.max_attempts == 0 {
            return Err(AnalysisError::Config("polling.max_attempts must be positive".into()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AnalysisError::Config(format!("{key} has invalid value '{value}'")))
}
