//! Network executor seam.
//!
//! [`HttpExecutor`] performs exactly one HTTP exchange and hands back the
//! status, headers and a body stream. Retry, header policy and stream
//! decoding live above it in [`HttpClient`](super::HttpClient), so they can
//! be exercised against a scripted executor in tests.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Request/response header map. Ordered for deterministic logging.
pub type Headers = BTreeMap<String, String>;

/// Incremental response body.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Failure to complete an exchange at the transport level.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// DNS, TCP or TLS failure before a response arrived
    #[error("could not connect: {0}")]
    Connect(String),

    /// The configured timeout elapsed
    #[error("timed out: {0}")]
    Timeout(String),

    /// Any other failure while sending the request
    #[error("{0}")]
    Request(String),

    /// The connection broke while reading the body
    #[error("body read failed: {0}")]
    Body(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A fully prepared request: absolute URL, final headers, serialized body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<String>,
    /// Total time allowed for the exchange; `None` for streams.
    pub timeout: Option<Duration>,
}

/// Status line and headers of a response whose body has not been read yet.
pub struct RawResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: ByteStream,
}

impl RawResponse {
    /// Drain the body stream into memory.
    pub async fn read_body(mut self) -> Result<(u16, Headers, Vec<u8>), TransportError> {
        let mut body = Vec::new();
        while let Some(chunk) = self.body.next().await {
            body.extend_from_slice(&chunk?);
        }
        Ok((self.status, self.headers, body))
    }
}

/// Performs a single HTTP exchange.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, TransportError>;
}

/// Production executor backed by `reqwest`.
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    /// Create an executor whose connection attempts give up after `connect_timeout`.
    ///
    /// Streaming requests carry no total timeout; `HttpClient` bounds the
    /// wait for each chunk instead.
    pub fn new(connect_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self { client }
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(send_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(body_error))
            .boxed();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn send_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

fn body_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else {
        TransportError::Body(err.to_string())
    }
}
