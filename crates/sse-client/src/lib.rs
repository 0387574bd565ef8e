//! Server-Sent Events client
//!
//! Connects to a `text/event-stream` endpoint, parses the wire format, and
//! delivers named, identified text events to registered subscribers. When a
//! stream ends the client reconnects after the server-adjustable interval and
//! resumes with `Last-Event-ID`.
//!
//! # Example
//!
//! ```rust,no_run
//! use sse_client::{EventSource, EventSourceConfig, Subscriber};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EventSourceConfig::new("http://localhost:8080/events")
//!         .header("Authorization", "Bearer token");
//!
//!     let source = EventSource::new(config)?;
//!     source.register(
//!         Subscriber::new(|event| {
//!             println!("{} {}", event.name().unwrap_or("message"), event.data());
//!         })
//!         .on_exception(|err| eprintln!("stream error: {}", err))
//!         .on_complete(|| println!("stream ended, will reconnect")),
//!     );
//!
//!     source.start()?;
//!     tokio::signal::ctrl_c().await?;
//!     source.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Wire format
//!
//! ```text
//! : comment, ignored
//! event: price
//! id: 42
//! retry: 2000
//! data: first line
//! data: second line
//!
//! ```
//!
//! The blank line dispatches an event with name `price`, id `42`, data
//! `"first line\nsecond line"`, and raises the reconnection interval to 2 s.
//!
//! # Testing
//!
//! The `testing` module provides an in-memory [`HttpFetcher`] and a local
//! axum server helper:
//!
//! ```rust,ignore
//! use sse_client::testing::ScriptedFetcher;
//!
//! let fetcher = ScriptedFetcher::new();
//! fetcher.push_stream("data: hello\n\n");
//! let source = EventSource::with_fetcher(config, fetcher.clone())?;
//! ```

mod config;
pub mod decoder;
mod dispatcher;
mod error;
mod event;
pub mod parser;
mod source;
pub mod testing;
pub mod transport;

pub use config::{
    EventSourceConfig, DEFAULT_CLOSE_GRACE_PERIOD_MS, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_RECONNECT_INTERVAL_MS,
};
pub use dispatcher::{CompleteCallback, Dispatcher, EventCallback, ExceptionCallback, Subscriber};
pub use error::{SseError, SseResult};
pub use event::{EventBuilder, ServerEvent};
pub use source::{ConnectionState, EventSource, EVENT_STREAM_CONTENT_TYPE};
pub use transport::{ByteStream, FetchResponse, HttpFetcher, ReqwestFetcher};
