//! Event source configuration

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{SseError, SseResult};

/// Default delay before reconnecting after a stream ends
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 500;
/// Default connect timeout of the built-in transport
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
/// Default bound on how long `close()` waits for the worker
pub const DEFAULT_CLOSE_GRACE_PERIOD_MS: u64 = 5_000;

/// Configuration for an [`EventSource`](crate::EventSource)
///
/// Can be built in code or loaded from TOML:
///
/// ```toml
/// url = "http://localhost:8080/events"
/// reconnect_interval_ms = 1000
///
/// [headers]
/// Authorization = "Bearer abc"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSourceConfig {
    /// Stream endpoint
    pub url: String,
    /// Initial reconnection interval; `retry:` fields replace it at runtime
    pub reconnect_interval_ms: u64,
    /// `Last-Event-ID` to send on the first request (empty = none)
    pub last_event_id: String,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
    /// Connect timeout of the built-in transport
    pub connect_timeout_ms: u64,
    /// How long `close()` waits for the worker to stop
    pub close_grace_period_ms: u64,
    /// Report status/content-type mismatches to exception subscribers
    pub report_protocol_errors: bool,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            last_event_id: String::new(),
            headers: BTreeMap::new(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            close_grace_period_ms: DEFAULT_CLOSE_GRACE_PERIOD_MS,
            report_protocol_errors: true,
        }
    }
}

impl EventSourceConfig {
    /// Create a configuration for `url` with default settings
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> SseResult<Self> {
        toml::from_str(content).map_err(|e| SseError::config(format!("Invalid TOML: {}", e)))
    }

    /// Load a configuration from a TOML file
    pub fn load_from(path: impl AsRef<Path>) -> SseResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| SseError::config(format!("{}: {}", path.display(), e)))
    }

    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval_ms = interval.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn last_event_id(mut self, id: impl Into<String>) -> Self {
        self.last_event_id = id.into();
        self
    }

    /// Add an extra request header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn close_grace_period(mut self, period: Duration) -> Self {
        self.close_grace_period_ms = period.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn report_protocol_errors(mut self, report: bool) -> Self {
        self.report_protocol_errors = report;
        self
    }

    pub fn reconnect_interval_duration(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn close_grace_period_duration(&self) -> Duration {
        Duration::from_millis(self.close_grace_period_ms)
    }

    /// Parse the endpoint URL
    pub fn parsed_url(&self) -> SseResult<Url> {
        if self.url.trim().is_empty() {
            return Err(SseError::config("URL must not be empty"));
        }
        Ok(Url::parse(&self.url)?)
    }

    /// Convert the extra headers into a header map
    pub fn header_map(&self) -> SseResult<HeaderMap> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SseError::InvalidHeader(format!("{}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SseError::InvalidHeader(format!("{}: {}", name, e)))?;
            map.insert(name, value);
        }
        Ok(map)
    }

    /// Check the configuration before a source is built from it
    pub fn validate(&self) -> SseResult<()> {
        let url = self.parsed_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SseError::config(format!(
                "Unsupported URL scheme: {}",
                url.scheme()
            )));
        }
        if self.close_grace_period_ms == 0 {
            return Err(SseError::config("Close grace period must be > 0"));
        }
        if self.last_event_id.contains('\0') {
            return Err(SseError::config("Last event id must not contain NUL"));
        }
        self.header_map()?;
        Ok(())
    }
}
