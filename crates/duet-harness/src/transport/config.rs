use std::time::Duration;

use crate::errors::HarnessError;

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Configuration for the HTTP transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root, for example `http://localhost:8000/api`.
    pub base_url: String,
    /// Timeout for request/response calls. Event streams are exempt.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Builds a config from `DUET_API_URL`, `DUET_REQUEST_TIMEOUT_SECS`, and
    /// `DUET_CONNECT_TIMEOUT_SECS`, falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self, HarnessError> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("DUET_API_URL")
            && !url.trim().is_empty()
        {
            config.base_url = url.trim().to_string();
        }
        if let Some(timeout) = env_secs("DUET_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = timeout;
        }
        if let Some(timeout) = env_secs("DUET_CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout = timeout;
        }
        Ok(config)
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Parses `base_url` into the root every endpoint is built from.
    pub(crate) fn base(&self) -> Result<reqwest::Url, HarnessError> {
        let url = reqwest::Url::parse(self.base_url.trim())
            .map_err(|e| HarnessError::Config(format!("invalid base_url {:?}: {e}", self.base_url)))?;
        if url.cannot_be_a_base() {
            return Err(HarnessError::Config(format!(
                "base_url {:?} cannot carry a path",
                self.base_url
            )));
        }
        Ok(url)
    }
}

/// Reads a whole-seconds duration; `Ok(None)` when unset or blank.
pub(crate) fn env_secs(key: &str) -> Result<Option<Duration>, HarnessError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|e| HarnessError::Config(format!("{key} must be whole seconds: {e}"))),
        _ => Ok(None),
    }
}
