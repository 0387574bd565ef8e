//! Connection controller
//!
//! [`EventSource`] drives connect → stream → reconnect cycles on a single
//! background task. The task alone owns the session (last event id and
//! reconnection interval); the only datum it shares with callers is the
//! [`ConnectionState`], which moves through compare-and-set transitions:
//!
//! ```text
//! CONNECTING ──(200 + text/event-stream)──► OPEN
//!     ▲                                       │
//!     └──────(body ended, still OPEN)─────────┘
//!
//! any ──(close, cancel, connect failure, bad response)──► CLOSED
//! ```
//!
//! A failed connect is not retried. Only a body that ends (or breaks off)
//! after the connection was opened leads to another attempt, after the
//! current reconnection interval.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CACHE_CONTROL};
use reqwest::StatusCode;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::EventSourceConfig;
use crate::dispatcher::{Dispatcher, Subscriber};
use crate::error::{SseError, SseResult};
use crate::event::ServerEvent;
use crate::parser::{self, EventSink};
use crate::transport::{FetchResponse, HttpFetcher, ReqwestFetcher};

/// Media type a stream response must carry
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

const LAST_EVENT_ID: HeaderName = HeaderName::from_static("last-event-id");

/// Lifecycle state of an [`EventSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Waiting for (or about to send) the next request
    Connecting = 0,
    /// Reading a response body
    Open = 1,
    /// Terminal; no further attempts
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Tri-state cell mutated only through compare-and-set
#[derive(Debug)]
struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from` → `to`; fails if another thread got there first
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Force CLOSED and return the previous state
    fn close(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.swap(ConnectionState::Closed as u8, Ordering::AcqRel))
    }
}

/// State visible to both the caller and the worker
#[derive(Debug)]
struct Shared {
    state: AtomicConnectionState,
    dispatcher: Dispatcher,
    /// Flipped to `true` once; wakes a pending reconnection delay
    shutdown: watch::Sender<bool>,
}

/// Values carried from one connection attempt to the next
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Session {
    pub(crate) last_event_id: String,
    pub(crate) reconnect_interval: Duration,
}

impl Session {
    fn new(config: &EventSourceConfig) -> Self {
        Self {
            last_event_id: config.last_event_id.clone(),
            reconnect_interval: config.reconnect_interval_duration(),
        }
    }

    /// Fold a dispatched event into the session
    ///
    /// A positive `retry` replaces the interval. The id always replaces the
    /// last event id, so an event without one clears it.
    pub(crate) fn observe(&mut self, event: &ServerEvent) {
        if let Some(retry) = event.retry.filter(|millis| *millis > 0) {
            self.reconnect_interval = Duration::from_millis(retry);
        }
        self.last_event_id = event.id.clone().unwrap_or_default();
    }

    /// Headers for the next request: `extra` plus the protocol headers
    pub(crate) fn request_headers(&self, extra: &HeaderMap) -> HeaderMap {
        let mut headers = extra.clone();
        headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM_CONTENT_TYPE));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.remove(LAST_EVENT_ID);

        if !self.last_event_id.is_empty() {
            match HeaderValue::from_bytes(self.last_event_id.as_bytes()) {
                Ok(value) => {
                    headers.insert(LAST_EVENT_ID, value);
                }
                Err(_) => warn!(
                    last_event_id = %self.last_event_id,
                    "Last event id is not a valid header value, not sent"
                ),
            }
        }

        headers
    }
}

/// Reconnecting Server-Sent Events client
///
/// Register subscribers, call [`start`](Self::start), and later
/// [`close`](Self::close). Events, exceptions and completions are delivered
/// on the background task, in registration order.
///
/// # Example
///
/// ```no_run
/// use sse_client::{EventSource, EventSourceConfig, Subscriber};
///
/// # async fn example() -> sse_client::SseResult<()> {
/// let source = EventSource::new(EventSourceConfig::new("http://localhost:8080/events"))?;
///
/// source
///     .register(
///         Subscriber::new(|event| println!("{:?}: {}", event.name(), event.data()))
///             .on_exception(|err| eprintln!("stream failed: {}", err)),
///     )
///     .on_event(|event| tracing::debug!(id = ?event.id(), "event"));
///
/// source.start()?;
/// // ...
/// source.close().await;
/// # Ok(())
/// # }
/// ```
///
/// Calling `start` twice is a usage error and returns
/// [`SseError::AlreadyStarted`]. Dropping the source cancels it and aborts
/// the worker, closing any open stream.
pub struct EventSource {
    url: Url,
    shared: Arc<Shared>,
    /// Worker waiting for `start`
    pending: Mutex<Option<Worker>>,
    /// Worker already running
    running: Mutex<Option<JoinHandle<()>>>,
    close_grace_period: Duration,
}

impl EventSource {
    /// Create a source that uses the built-in reqwest transport
    pub fn new(config: EventSourceConfig) -> SseResult<Self> {
        let fetcher = ReqwestFetcher::with_connect_timeout(config.connect_timeout_duration())?;
        Self::with_fetcher(config, fetcher)
    }

    /// Create a source that issues its requests through `fetcher`
    pub fn with_fetcher<F>(config: EventSourceConfig, fetcher: F) -> SseResult<Self>
    where
        F: HttpFetcher + 'static,
    {
        config.validate()?;

        let url = config.parsed_url()?;
        let extra_headers = config.header_map()?;
        let (shutdown, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            state: AtomicConnectionState::new(ConnectionState::Connecting),
            dispatcher: Dispatcher::new(),
            shutdown,
        });

        let worker = Worker {
            shared: Arc::clone(&shared),
            fetcher: Box::new(fetcher),
            url: url.clone(),
            extra_headers,
            session: Session::new(&config),
            report_protocol_errors: config.report_protocol_errors,
            shutdown: shutdown_rx,
        };

        Ok(Self {
            url,
            shared,
            pending: Mutex::new(Some(worker)),
            running: Mutex::new(None),
            close_grace_period: config.close_grace_period_duration(),
        })
    }

    /// Stream endpoint
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Current connection state
    pub fn ready_state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    /// Add a subscriber; may be called at any time, from any thread
    pub fn register(&self, subscriber: Subscriber) -> &Self {
        self.shared.dispatcher.register(subscriber);
        self
    }

    /// Add an event-only subscriber
    pub fn on_event<F>(&self, on_event: F) -> &Self
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.register(Subscriber::new(on_event))
    }

    /// Spawn the background worker and schedule the first attempt
    ///
    /// Must be called from within a Tokio runtime. Returns immediately.
    pub fn start(&self) -> SseResult<()> {
        let runtime = Handle::try_current().map_err(|_| SseError::NoRuntime)?;

        let worker = self.pending.lock().take().ok_or(SseError::AlreadyStarted)?;

        if self.shared.state.load().is_closed() {
            debug!(url = %self.url, "SSE source closed before start, worker not spawned");
            return Ok(());
        }

        let handle = runtime.spawn(worker.run());
        *self.running.lock() = Some(handle);
        Ok(())
    }

    /// Mark the source CLOSED and cancel any pending reconnection, without
    /// waiting for the worker
    ///
    /// Safe to call from a subscriber callback.
    pub fn cancel(&self) {
        let previous = self.shared.state.close();
        self.shared.shutdown.send_replace(true);
        if !previous.is_closed() {
            info!(url = %self.url, from = %previous, "SSE source closed");
        }
    }

    /// Close the source and wait, bounded, for the worker to stop
    ///
    /// An in-flight read is not interrupted; the worker stops at its next
    /// decision point. If it has not stopped within the configured grace
    /// period it is aborted. Repeated calls have no further effect.
    pub async fn close(&self) {
        self.cancel();

        let handle = self.running.lock().take();
        let Some(mut handle) = handle else {
            return;
        };

        match tokio::time::timeout(self.close_grace_period, &mut handle).await {
            Ok(_) => debug!(url = %self.url, "SSE worker stopped"),
            Err(_) => {
                warn!(
                    url = %self.url,
                    grace_ms = self.close_grace_period.as_millis() as u64,
                    "SSE worker still busy after grace period, aborting"
                );
                handle.abort();
            }
        }
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.cancel();
        if let Some(handle) = self.running.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("url", &self.url.as_str())
            .field("state", &self.ready_state())
            .field("dispatcher", &self.shared.dispatcher)
            .finish()
    }
}

/// What the worker does after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Reconnect,
    Finalize,
}

/// Background task owning the session
struct Worker {
    shared: Arc<Shared>,
    fetcher: Box<dyn HttpFetcher>,
    url: Url,
    extra_headers: HeaderMap,
    session: Session,
    report_protocol_errors: bool,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        while self.attempt().await == Next::Reconnect {
            if !self.wait_reconnect().await {
                break;
            }
        }

        self.shared.state.close();
        debug!(url = %self.url, "SSE worker finished");
    }

    /// One connect + read cycle
    async fn attempt(&mut self) -> Next {
        if self.shared.state.load() != ConnectionState::Connecting {
            return Next::Finalize;
        }

        let headers = self.session.request_headers(&self.extra_headers);
        info!(
            url = %self.url,
            last_event_id = %self.session.last_event_id,
            "SSE connecting"
        );

        let response = match self.fetcher.fetch(&self.url, headers).await {
            Ok(response) => response,
            Err(err) => {
                error!(url = %self.url, error = %err, "SSE connection failed");
                self.shared.dispatcher.on_exception(&err);
                return Next::Finalize;
            }
        };

        if let Err(err) = check_response(&response) {
            warn!(url = %self.url, error = %err, "SSE response rejected");
            if self.report_protocol_errors {
                self.shared.dispatcher.on_exception(&err);
            }
            return Next::Finalize;
        }

        if !self
            .shared
            .state
            .transition(ConnectionState::Connecting, ConnectionState::Open)
        {
            debug!(url = %self.url, "SSE source closed while connecting");
            return Next::Finalize;
        }
        info!(url = %self.url, "SSE connection open");

        let mut sink = SessionSink {
            session: &mut self.session,
            dispatcher: &self.shared.dispatcher,
        };
        parser::parse(Some(response.body), &mut sink).await;

        if self
            .shared
            .state
            .transition(ConnectionState::Open, ConnectionState::Connecting)
        {
            Next::Reconnect
        } else {
            debug!(url = %self.url, "SSE body ended after close");
            Next::Finalize
        }
    }

    /// Sleep for the reconnection interval; `false` if closed meanwhile
    async fn wait_reconnect(&mut self) -> bool {
        let delay = self.session.reconnect_interval;
        info!(
            url = %self.url,
            delay_ms = delay.as_millis() as u64,
            "SSE stream ended, reconnecting after interval"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                self.shared.state.load() == ConnectionState::Connecting
            }
            _ = self.shutdown.wait_for(|closed| *closed) => false,
        }
    }
}

/// Parser output: updates the session, then fans out to subscribers
struct SessionSink<'a> {
    session: &'a mut Session,
    dispatcher: &'a Dispatcher,
}

impl EventSink for SessionSink<'_> {
    fn event(&mut self, event: ServerEvent) {
        self.session.observe(&event);
        debug!(
            event = ?event.name,
            id = ?event.id,
            data_len = event.data.len(),
            "SSE event received"
        );
        self.dispatcher.on_event(&event);
    }

    fn exception(&mut self, err: SseError) {
        error!(error = %err, "SSE stream read failed");
        self.dispatcher.on_exception(&err);
    }

    fn complete(&mut self) {
        debug!("SSE body complete");
        self.dispatcher.on_complete();
    }
}

/// Require `200` and exactly `text/event-stream`
fn check_response(response: &FetchResponse) -> SseResult<()> {
    if response.status != StatusCode::OK {
        return Err(SseError::InvalidStatus {
            status: response.status.as_u16(),
        });
    }

    match response.content_type() {
        Some(EVENT_STREAM_CONTENT_TYPE) => Ok(()),
        other => Err(SseError::InvalidContentType {
            content_type: other.unwrap_or_default().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wait_for, ScriptedFetcher};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(5);

    fn config() -> EventSourceConfig {
        EventSourceConfig::new("http://stream.test/events")
            .reconnect_interval(Duration::from_millis(10))
            .close_grace_period(Duration::from_millis(500))
    }

    fn event_with(id: Option<&str>, retry: Option<u64>) -> ServerEvent {
        ServerEvent {
            id: id.map(String::from),
            retry,
            ..Default::default()
        }
    }

    // =========================================================================
    // Session
    // =========================================================================

    #[test]
    fn test_session_retry_override() {
        let mut session = Session::new(&config());
        assert_eq!(session.reconnect_interval, Duration::from_millis(10));

        session.observe(&event_with(None, Some(2000)));
        assert_eq!(session.reconnect_interval, Duration::from_millis(2000));

        // Zero is not an override
        session.observe(&event_with(None, Some(0)));
        assert_eq!(session.reconnect_interval, Duration::from_millis(2000));

        session.observe(&event_with(None, None));
        assert_eq!(session.reconnect_interval, Duration::from_millis(2000));
    }

    #[test]
    fn test_session_last_event_id_not_cumulative() {
        let mut session = Session::new(&config());
        let ids = [None, None, Some("k"), None, None];
        let mut observed = Vec::new();

        for id in ids {
            session.observe(&event_with(id, None));
            observed.push(session.last_event_id.clone());
        }

        assert_eq!(observed, vec!["", "", "k", "", ""]);
    }

    #[test]
    fn test_request_headers() {
        let mut extra = HeaderMap::new();
        extra.insert("x-api-key", HeaderValue::from_static("secret"));
        extra.insert(ACCEPT, HeaderValue::from_static("application/json"));
        extra.insert(LAST_EVENT_ID, HeaderValue::from_static("spoofed"));

        let mut session = Session::new(&config());
        let headers = session.request_headers(&extra);
        assert_eq!(headers.get(ACCEPT).unwrap(), "text/event-stream");
        assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-store");
        assert_eq!(headers.get("x-api-key").unwrap(), "secret");
        assert!(headers.get(LAST_EVENT_ID).is_none());

        session.last_event_id = "evt-9".into();
        let headers = session.request_headers(&extra);
        assert_eq!(headers.get("last-event-id").unwrap(), "evt-9");
    }

    // =========================================================================
    // State
    // =========================================================================

    #[test]
    fn test_state_transitions() {
        let state = AtomicConnectionState::new(ConnectionState::Connecting);
        assert!(state.transition(ConnectionState::Connecting, ConnectionState::Open));
        assert!(!state.transition(ConnectionState::Connecting, ConnectionState::Open));
        assert_eq!(state.load(), ConnectionState::Open);

        assert_eq!(state.close(), ConnectionState::Open);
        assert!(!state.transition(ConnectionState::Open, ConnectionState::Connecting));
        assert_eq!(state.load(), ConnectionState::Closed);
        assert_eq!(state.close(), ConnectionState::Closed);
    }

    #[test]
    fn test_check_response() {
        use crate::transport::FetchResponse;
        use futures::stream;
        use reqwest::header::CONTENT_TYPE;

        let with = |status: StatusCode, content_type: Option<&'static str>| {
            let mut headers = HeaderMap::new();
            if let Some(ct) = content_type {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
            }
            FetchResponse::new(status, headers, Box::pin(stream::empty()))
        };

        assert!(check_response(&with(StatusCode::OK, Some("text/event-stream"))).is_ok());
        assert!(matches!(
            check_response(&with(StatusCode::NO_CONTENT, Some("text/event-stream"))),
            Err(SseError::InvalidStatus { status: 204 })
        ));
        assert!(matches!(
            check_response(&with(StatusCode::OK, Some("text/event-stream; charset=utf-8"))),
            Err(SseError::InvalidContentType { .. })
        ));
        assert!(matches!(
            check_response(&with(StatusCode::OK, None)),
            Err(SseError::InvalidContentType { ref content_type }) if content_type.is_empty()
        ));
    }

    // =========================================================================
    // Worker
    // =========================================================================

    #[tokio::test]
    async fn test_events_dispatched_then_reconnect_with_last_event_id() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_stream("id: 1\ndata: first\n\nid: 2\ndata: second\n\n");
        fetcher.push_stream("data: third\n\n");

        let source = EventSource::with_fetcher(config(), fetcher.clone()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let completions = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let c = completions.clone();
        source.register(
            Subscriber::new(move |event| s.lock().push(event.data.clone())).on_complete(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(source.ready_state(), ConnectionState::Connecting);
        source.start().unwrap();

        // Script runs out on the third request, which fails and finalizes
        assert!(wait_for(|| source.ready_state().is_closed(), WAIT).await);

        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
        assert_eq!(completions.load(Ordering::SeqCst), 2);

        let requests = fetcher.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].get("last-event-id").is_none());
        assert_eq!(requests[1].get("last-event-id").unwrap(), "2");
        // "third" carried no id, so the id is cleared
        assert!(requests[2].get("last-event-id").is_none());

        source.close().await;
    }

    #[tokio::test]
    async fn test_initial_last_event_id_sent() {
        let fetcher = ScriptedFetcher::new();
        let source =
            EventSource::with_fetcher(config().last_event_id("resume-7"), fetcher.clone())
                .unwrap();
        source.start().unwrap();

        assert!(wait_for(|| source.ready_state().is_closed(), WAIT).await);
        assert_eq!(
            fetcher.requests()[0].get("last-event-id").unwrap(),
            "resume-7"
        );
    }

    #[tokio::test]
    async fn test_connect_failure_reported_and_not_retried() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_error(SseError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        fetcher.push_stream("data: never\n\n");

        let source = EventSource::with_fetcher(config(), fetcher.clone()).unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(AtomicUsize::new(0));
        let e = errors.clone();
        let n = events.clone();
        source.register(
            Subscriber::new(move |_| {
                n.fetch_add(1, Ordering::SeqCst);
            })
            .on_exception(move |err| e.lock().push(err.to_string())),
        );
        source.start().unwrap();

        assert!(wait_for(|| source.ready_state().is_closed(), WAIT).await);
        source.close().await;

        assert_eq!(*errors.lock(), vec!["IO error: refused"]);
        assert_eq!(events.load(Ordering::SeqCst), 0);
        assert_eq!(fetcher.request_count(), 1);
    }

    #[tokio::test]
    async fn test_protocol_mismatch_reported_when_enabled() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_response(StatusCode::NOT_FOUND, EVENT_STREAM_CONTENT_TYPE, "");

        let source = EventSource::with_fetcher(config(), fetcher.clone()).unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        source.register(
            Subscriber::new(|_| {}).on_exception(move |err| {
                e.lock().push(err.is_protocol_mismatch());
            }),
        );
        source.start().unwrap();

        assert!(wait_for(|| source.ready_state().is_closed(), WAIT).await);
        assert_eq!(*errors.lock(), vec![true]);
        assert_eq!(fetcher.request_count(), 1);
    }

    #[tokio::test]
    async fn test_protocol_mismatch_silent_when_disabled() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_response(StatusCode::OK, "application/json", "data: hidden\n\n");

        let source =
            EventSource::with_fetcher(config().report_protocol_errors(false), fetcher.clone())
                .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = calls.clone();
        let c2 = calls.clone();
        source.register(
            Subscriber::new(move |_| {
                c1.fetch_add(1, Ordering::SeqCst);
            })
            .on_exception(move |_| {
                c2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        source.start().unwrap();

        assert!(wait_for(|| source.ready_state().is_closed(), WAIT).await);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retry_field_sets_reconnect_delay() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_stream("retry: 300\n\n");
        fetcher.push_stream("data: after\n\n");

        let source = EventSource::with_fetcher(config(), fetcher.clone()).unwrap();
        let started = tokio::time::Instant::now();
        source.start().unwrap();

        assert!(wait_for(|| fetcher.request_count() == 2, WAIT).await);
        assert!(started.elapsed() >= Duration::from_millis(300));

        source.close().await;
    }

    #[tokio::test]
    async fn test_body_error_reported_then_reconnects() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_broken_stream("id: a\ndata: ok\n\n", std::io::ErrorKind::ConnectionReset);
        fetcher.push_stream("data: again\n\n");

        let source = EventSource::with_fetcher(config(), fetcher.clone()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let l1 = log.clone();
        let l2 = log.clone();
        source.register(
            Subscriber::new(move |event| l1.lock().push(format!("event:{}", event.data)))
                .on_exception(move |_| l2.lock().push("exception".to_string())),
        );
        source.start().unwrap();

        assert!(wait_for(|| source.ready_state().is_closed(), WAIT).await);

        let log = log.lock().clone();
        assert_eq!(&log[..3], &["event:ok", "exception", "event:again"]);
        assert_eq!(fetcher.requests()[1].get("last-event-id").unwrap(), "a");
    }

    #[tokio::test]
    async fn test_close_cancels_pending_reconnect() {
        let fetcher = ScriptedFetcher::new();
        fetcher.push_stream("data: only\n\n");
        fetcher.push_stream("data: too late\n\n");

        let config = config().reconnect_interval(Duration::from_secs(60));
        let source = EventSource::with_fetcher(config, fetcher.clone()).unwrap();
        source.start().unwrap();

        // First body consumed, now sleeping for the interval
        let sleeping = || {
            fetcher.request_count() == 1 && source.ready_state() == ConnectionState::Connecting
        };
        assert!(wait_for(sleeping, WAIT).await);

        let started = tokio::time::Instant::now();
        source.close().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(source.ready_state(), ConnectionState::Closed);
        assert_eq!(fetcher.request_count(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let source = EventSource::with_fetcher(config(), ScriptedFetcher::new()).unwrap();
        source.start().unwrap();

        source.close().await;
        assert_eq!(source.ready_state(), ConnectionState::Closed);
        source.close().await;
        source.cancel();
        assert_eq!(source.ready_state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let source = EventSource::with_fetcher(config(), ScriptedFetcher::new()).unwrap();
        source.start().unwrap();
        assert!(matches!(source.start(), Err(SseError::AlreadyStarted)));
        source.close().await;
    }

    #[tokio::test]
    async fn test_start_after_close_does_nothing() {
        let fetcher = ScriptedFetcher::new();
        let source = EventSource::with_fetcher(config(), fetcher.clone()).unwrap();
        source.close().await;

        source.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fetcher.request_count(), 0);
        assert_eq!(source.ready_state(), ConnectionState::Closed);
    }

    #[test]
    fn test_start_outside_runtime() {
        let source = EventSource::with_fetcher(config(), ScriptedFetcher::new()).unwrap();
        assert!(matches!(source.start(), Err(SseError::NoRuntime)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = EventSource::with_fetcher(EventSourceConfig::default(), ScriptedFetcher::new());
        assert!(matches!(result, Err(SseError::Config(_))));
    }

    #[test]
    fn test_new_builds_reqwest_transport_from_config() {
        let config = config().connect_timeout(Duration::from_millis(250));
        assert_eq!(config.connect_timeout_duration(), Duration::from_millis(250));

        let source = EventSource::new(config).unwrap();
        assert_eq!(source.url().as_str(), "http://stream.test/events");
        assert_eq!(source.ready_state(), ConnectionState::Connecting);
    }
}
