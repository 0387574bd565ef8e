//! Error types for event source operations

use thiserror::Error;

/// Result type alias for event source operations
pub type SseResult<T> = std::result::Result<T, SseError>;

/// Errors that can occur while connecting to or reading from an event stream
///
/// Malformed protocol fields are never errors; they are dropped by the
/// field decoder.
#[derive(Error, Debug)]
pub enum SseError {
    /// Connecting failed, or the body broke off mid-read
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// IO error while reading the body
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server answered with something other than 200
    #[error("Unexpected status {status}, expected 200")]
    InvalidStatus { status: u16 },

    /// Server answered with a content type other than `text/event-stream`
    #[error("Unexpected content type {content_type:?}, expected \"text/event-stream\"")]
    InvalidContentType { content_type: String },

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Header name or value is not valid HTTP
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Configuration rejected by validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// `start()` was called on a source that already has a worker
    #[error("Event source already started")]
    AlreadyStarted,

    /// `start()` was called outside a Tokio runtime
    #[error("No Tokio runtime available to run the event source worker")]
    NoRuntime,
}

impl SseError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns `true` for the status and content-type checks on the response
    pub fn is_protocol_mismatch(&self) -> bool {
        matches!(
            self,
            Self::InvalidStatus { .. } | Self::InvalidContentType { .. }
        )
    }
}
