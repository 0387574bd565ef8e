//! HTTP collaborator seam
//!
//! The event source only needs "GET this URL with these headers and hand me
//! the status, headers and an incremental body". [`HttpFetcher`] is that
//! contract; [`ReqwestFetcher`] is the default implementation.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{SseError, SseResult};

/// Incremental response body
pub type ByteStream = Pin<Box<dyn Stream<Item = SseResult<Bytes>> + Send>>;

/// Status, headers and body of a response whose body has not been read yet
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl FetchResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: ByteStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Raw `Content-Type` header value, if present and valid UTF-8
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Issues the GET request that opens a stream
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Send `GET url` with `headers`
    ///
    /// Resolves once response headers arrive. Errors here are transport
    /// failures; status and content type are checked by the caller.
    async fn fetch(&self, url: &Url, headers: HeaderMap) -> SseResult<FetchResponse>;
}

/// [`HttpFetcher`] backed by a `reqwest::Client`
///
/// Only a connect timeout is applied: a whole-request timeout would cut
/// long-lived streams.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn with_connect_timeout(connect_timeout: Duration) -> SseResult<Self> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    #[instrument(skip(self, url, headers), fields(url = %url))]
    async fn fetch(&self, url: &Url, headers: HeaderMap) -> SseResult<FetchResponse> {
        let response = self.client.get(url.clone()).headers(headers).send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        debug!(status = status.as_u16(), "SSE response received");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(SseError::from));

        Ok(FetchResponse::new(status, headers, Box::pin(body)))
    }
}
