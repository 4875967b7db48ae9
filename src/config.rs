//! Client configuration for a3s-preview
//!
//! Built programmatically via `PreviewConfig::new()` + builder methods, or
//! loaded from a camelCase JSON file with `PreviewConfig::from_file()`.

use crate::error::{PreviewError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings for the preview controller and its HTTP backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewConfig {
    /// Base URL of the platform API (e.g. "https://api.example.com/v1")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Admin credential exchanged server-side for agent session tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,

    /// Quiet period before an automatic preview fires
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,

    /// Tokens this close to expiry are refreshed before use
    #[serde(default = "default_token_safety_window_ms")]
    pub token_safety_window_ms: u64,

    /// HTTP request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Capacity of the lifecycle event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_quiet_period_ms() -> u64 {
    800
}

fn default_token_safety_window_ms() -> u64 {
    5000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    64
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            admin_token: None,
            quiet_period_ms: default_quiet_period_ms(),
            token_safety_window_ms: default_token_safety_window_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl PreviewConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the admin credential
    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }

    /// Set the debounce quiet period
    pub fn with_quiet_period(mut self, period: Duration) -> Self {
        self.quiet_period_ms = saturating_millis(period);
        self
    }

    /// Set the token safety window
    pub fn with_token_safety_window(mut self, window: Duration) -> Self {
        self.token_safety_window_ms = saturating_millis(window);
        self
    }

    /// Load and validate a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PreviewError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: Self = serde_json::from_str(&json).map_err(|e| {
            PreviewError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;
        config.validate()?;

        tracing::debug!(path = %path.display(), base_url = %config.base_url, "Config loaded");
        Ok(config)
    }

    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(PreviewError::Config("baseUrl must not be empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(PreviewError::Config(format!(
                "baseUrl must be an http(s) URL: {}",
                self.base_url
            )));
        }
        if self.quiet_period_ms == 0 {
            return Err(PreviewError::Config("quietPeriodMs must be positive".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(PreviewError::Config("eventCapacity must be positive".to_string()));
        }
        Ok(())
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn token_safety_window(&self) -> Duration {
        Duration::from_millis(self.token_safety_window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
