//! Test utilities for sse-client
//!
//! - [`TestServer`]: serve an axum router on an ephemeral local port
//! - [`ScriptedFetcher`]: in-memory [`HttpFetcher`] replaying scripted responses
//! - [`wait_for`]: poll a condition until a deadline

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use tokio::net::TcpListener;
use url::Url;

use crate::error::{SseError, SseResult};
use crate::source::EVENT_STREAM_CONTENT_TYPE;
use crate::transport::{FetchResponse, HttpFetcher};

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve `router` on `127.0.0.1` with an OS-assigned port
    ///
    /// # Example
    ///
    /// ```ignore
    /// use axum::{routing::get, Router};
    /// use sse_client::testing::TestServer;
    ///
    /// let server = TestServer::start(Router::new().route("/events", get(events))).await?;
    /// let config = EventSourceConfig::new(server.url("/events"));
    /// ```
    pub async fn start<S>(router: axum::Router<S>) -> SseResult<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let router: axum::Router = router.into();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL for `path` on this server
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// One scripted outcome of a fetch
enum Scripted {
    Response {
        status: StatusCode,
        content_type: String,
        chunks: Vec<SseResult<Bytes>>,
    },
    Error(SseError),
}

#[derive(Default)]
struct Script {
    outcomes: VecDeque<Scripted>,
    requests: Vec<HeaderMap>,
}

/// [`HttpFetcher`] that replays queued outcomes in order
///
/// Every request's headers are recorded. Once the queue is empty, each fetch
/// fails with a connection-refused error, which makes an event source
/// finalize. Clones share the same script.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    script: Arc<Mutex<Script>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a `200 text/event-stream` response with `body`
    pub fn push_stream(&self, body: &str) -> &Self {
        self.push_response(StatusCode::OK, EVENT_STREAM_CONTENT_TYPE, body)
    }

    /// Queue an arbitrary response
    pub fn push_response(&self, status: StatusCode, content_type: &str, body: &str) -> &Self {
        self.push(Scripted::Response {
            status,
            content_type: content_type.to_string(),
            chunks: vec![Ok(Bytes::from(body.to_string()))],
        })
    }

    /// Queue a stream response whose body fails with `kind` after `body`
    pub fn push_broken_stream(&self, body: &str, kind: std::io::ErrorKind) -> &Self {
        self.push(Scripted::Response {
            status: StatusCode::OK,
            content_type: EVENT_STREAM_CONTENT_TYPE.to_string(),
            chunks: vec![
                Ok(Bytes::from(body.to_string())),
                Err(SseError::Io(std::io::Error::new(kind, "scripted body failure"))),
            ],
        })
    }

    /// Queue a transport failure
    pub fn push_error(&self, err: SseError) -> &Self {
        self.push(Scripted::Error(err))
    }

    /// Headers of every request made so far
    pub fn requests(&self) -> Vec<HeaderMap> {
        self.script.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.script.lock().requests.len()
    }

    fn push(&self, outcome: Scripted) -> &Self {
        self.script.lock().outcomes.push_back(outcome);
        self
    }
}

#[async_trait]
impl HttpFetcher for ScriptedFetcher {
    async fn fetch(&self, _url: &Url, headers: HeaderMap) -> SseResult<FetchResponse> {
        let outcome = {
            let mut script = self.script.lock();
            script.requests.push(headers);
            script.outcomes.pop_front()
        };

        match outcome {
            Some(Scripted::Response {
                status,
                content_type,
                chunks,
            }) => {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    headers.insert(CONTENT_TYPE, value);
                }
                Ok(FetchResponse::new(
                    status,
                    headers,
                    Box::pin(stream::iter(chunks)),
                ))
            }
            Some(Scripted::Error(err)) => Err(err),
            None => Err(SseError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "script exhausted",
            ))),
        }
    }
}

/// Wait for a condition with timeout
pub async fn wait_for<F>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    condition()
}
