//! HTTP transport for provider APIs.
//!
//! [`HttpClient`] issues JSON requests against a base URL with bearer-token
//! auth, a timeout and retry with exponential backoff, and decodes streamed
//! responses into content deltas. It never returns an error: every failure,
//! including an unreachable host, comes back as an [`HttpResponse`] with
//! `success == false` and a human-readable `error_message`.

pub mod executor;
pub mod retry;
pub mod sse;

pub use executor::{
    ByteStream, Headers, HttpExecutor, HttpRequest, Method, RawResponse, ReqwestExecutor,
    TransportError,
};
pub use retry::{FailureKind, RetryPolicy};
pub use sse::{error_text, DeltaExtractor, Framing, StreamDecoder, StreamEvent};

use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest slice of an error body copied into `error_message`.
const ERROR_EXCERPT_CHARS: usize = 512;

/// Outcome of one logical HTTP exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    /// HTTP status, or 0 when no response was received
    pub status_code: u16,
    pub body: String,
    pub headers: Headers,
    /// `status_code` is in [200, 300)
    pub success: bool,
    pub error_message: String,
}

impl HttpResponse {
    /// Build a response from a received status line, headers and body.
    pub fn from_parts(status_code: u16, headers: Headers, body: String) -> Self {
        let success = (200..300).contains(&status_code);
        let error_message = if success {
            String::new()
        } else {
            format!("HTTP {}: {}", status_code, excerpt(&body))
        };

        Self {
            status_code,
            body,
            headers,
            success,
            error_message,
        }
    }

    /// The exchange never produced a response.
    pub fn transport_failure(err: &TransportError) -> Self {
        Self {
            status_code: 0,
            body: String::new(),
            headers: Headers::new(),
            success: false,
            error_message: format!("Connection failed: {}", err),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        FailureKind::classify(self)
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// JSON-over-HTTPS client bound to one API base URL.
///
/// Configure it with the `set_*` methods before sharing it; clones share the
/// underlying connection pool but not configuration.
#[derive(Clone)]
pub struct HttpClient {
    executor: Arc<dyn HttpExecutor>,
    base_url: String,
    bearer_token: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
    buffered_streaming: bool,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("buffered_streaming", &self.buffered_streaming)
            .finish()
    }
}

impl HttpClient {
    /// Create a client for `base_url` using the `reqwest` executor.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_executor(base_url, timeout, Arc::new(ReqwestExecutor::new(timeout)))
    }

    /// Create a client that performs exchanges through `executor`.
    pub fn with_executor(
        base_url: impl Into<String>,
        timeout: Duration,
        executor: Arc<dyn HttpExecutor>,
    ) -> Self {
        Self {
            executor,
            base_url: base_url.into(),
            bearer_token: None,
            timeout,
            retry: RetryPolicy::default(),
            buffered_streaming: false,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_bearer_token(&mut self, token: impl Into<String>) {
        let token = token.into();
        self.bearer_token = (!token.is_empty()).then_some(token);
    }

    /// Total time allowed for each non-streaming attempt. For streams it is
    /// the longest wait for the response head and between body chunks.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_retry_count(&mut self, count: u32) {
        self.retry.retry_count = count;
    }

    pub fn set_retry_delay(&mut self, delay: Duration) {
        self.retry.base_delay = delay;
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Read whole stream bodies before decoding them.
    ///
    /// This is a portability fallback for executors that cannot deliver a
    /// body incrementally: every chunk is still reported, in order, but only
    /// after the server has finished sending.
    pub fn set_buffered_streaming(&mut self, buffered: bool) {
        self.buffered_streaming = buffered;
    }

    fn url_for(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Caller headers first; standard headers only fill in what is missing.
    fn prepare_headers(&self, custom: &Headers) -> Headers {
        let mut headers = custom.clone();
        insert_if_missing(&mut headers, "Content-Type", "application/json");
        insert_if_missing(&mut headers, "Accept", "application/json");

        if let Some(ref token) = self.bearer_token {
            insert_if_missing(&mut headers, "Authorization", &format!("Bearer {}", token));
        }

        headers
    }

    /// POST a JSON body, retrying per the configured policy.
    #[instrument(skip(self, body, headers), fields(base_url = %self.base_url))]
    pub async fn post(&self, endpoint: &str, body: &Value, headers: &Headers) -> HttpResponse {
        let request = HttpRequest {
            method: Method::Post,
            url: self.url_for(endpoint),
            headers: self.prepare_headers(headers),
            body: Some(body.to_string()),
            timeout: Some(self.timeout),
        };

        self.send_with_retry(request).await
    }

    /// GET, retrying per the configured policy.
    #[instrument(skip(self, headers), fields(base_url = %self.base_url))]
    pub async fn get(&self, endpoint: &str, headers: &Headers) -> HttpResponse {
        let request = HttpRequest {
            method: Method::Get,
            url: self.url_for(endpoint),
            headers: self.prepare_headers(headers),
            body: None,
            timeout: Some(self.timeout),
        };

        self.send_with_retry(request).await
    }

    /// [`HttpClient::post`] on a background task; returns immediately.
    pub fn post_async(&self, endpoint: &str, body: Value, headers: Headers) -> JoinHandle<HttpResponse> {
        let client = self.clone();
        let endpoint = endpoint.to_string();
        tokio::spawn(async move { client.post(&endpoint, &body, &headers).await })
    }

    /// POST and decode an OpenAI-style SSE stream.
    ///
    /// `on_chunk(text, false)` is called for every content delta in order,
    /// followed by exactly one `on_chunk("", true)`.
    pub async fn post_stream<F>(
        &self,
        endpoint: &str,
        body: &Value,
        headers: &Headers,
        on_chunk: F,
    ) -> HttpResponse
    where
        F: FnMut(&str, bool) + Send,
    {
        self.post_stream_with(endpoint, body, headers, StreamDecoder::openai_sse(), on_chunk)
            .await
    }

    /// POST and decode a streamed body with a provider-specific decoder.
    ///
    /// Streams are not retried. On a non-2xx status no chunk is reported and
    /// the returned response carries the error body. On success the returned
    /// body is empty; the content went to `on_chunk`. The terminal
    /// `on_chunk("", true)` is delivered exactly once even when the server
    /// closes the connection without an explicit end marker.
    ///
    /// A stream has no total deadline, but going quiet for longer than the
    /// configured timeout interrupts it. An error event from the provider
    /// also ends the stream and makes the response a failure.
    #[instrument(skip(self, body, headers, decoder, on_chunk), fields(base_url = %self.base_url))]
    pub async fn post_stream_with<F>(
        &self,
        endpoint: &str,
        body: &Value,
        headers: &Headers,
        mut decoder: StreamDecoder,
        mut on_chunk: F,
    ) -> HttpResponse
    where
        F: FnMut(&str, bool) + Send,
    {
        let mut prepared = self.prepare_headers(headers);
        let accept = match decoder.framing() {
            Framing::ServerSentEvents => "text/event-stream",
            Framing::NewlineDelimitedJson => "application/x-ndjson",
        };
        set_header(&mut prepared, "Accept", accept);

        let request = HttpRequest {
            method: Method::Post,
            url: self.url_for(endpoint),
            headers: prepared,
            body: Some(body.to_string()),
            timeout: None,
        };

        let idle = self.timeout;
        let raw = match tokio::time::timeout(idle, self.executor.execute(request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!("Stream request failed: {}", e);
                return HttpResponse::transport_failure(&e);
            }
            Err(_) => {
                let e = TransportError::Timeout(format!("no response within {:?}", idle));
                warn!("Stream request failed: {}", e);
                return HttpResponse::transport_failure(&e);
            }
        };

        if !(200..300).contains(&raw.status) {
            return match tokio::time::timeout(idle, raw.read_body()).await {
                Ok(Ok((status, headers, body))) => {
                    HttpResponse::from_parts(status, headers, String::from_utf8_lossy(&body).into_owned())
                }
                Ok(Err(e)) => HttpResponse::transport_failure(&e),
                Err(_) => HttpResponse::transport_failure(&TransportError::Timeout(format!(
                    "error body not received within {:?}",
                    idle
                ))),
            };
        }

        let status = raw.status;
        let response_headers = raw.headers;
        let mut body_stream = raw.body;

        let mut provider_error = None;
        let mut dispatch = |events: Vec<StreamEvent>| {
            for event in events {
                match event {
                    StreamEvent::Delta(text) => on_chunk(&text, false),
                    StreamEvent::Error(message) => provider_error = Some(message),
                    StreamEvent::Done => {}
                }
            }
        };

        let mut interrupted = None;
        let mut buffered = Vec::new();
        while let Some(chunk) = next_chunk(&mut body_stream, idle).await {
            match chunk {
                Ok(bytes) if self.buffered_streaming => buffered.extend_from_slice(&bytes),
                Ok(bytes) => dispatch(decoder.feed(&bytes)),
                Err(e) => {
                    interrupted = Some(e);
                    break;
                }
            }
            if decoder.is_done() {
                break;
            }
        }
        if interrupted.is_none() {
            if self.buffered_streaming {
                dispatch(decoder.feed(&buffered));
            }
            dispatch(decoder.finish());
        }

        if !decoder.is_done() && interrupted.is_none() {
            debug!("Stream closed without an end marker");
        }
        on_chunk("", true);

        let error_message = match (interrupted, provider_error) {
            (Some(e), _) => format!("Stream interrupted: {}", e),
            (None, Some(message)) => format!("Provider error: {}", message),
            (None, None) => return HttpResponse::from_parts(status, response_headers, String::new()),
        };

        warn!("{}", error_message);
        HttpResponse {
            status_code: status,
            body: String::new(),
            headers: response_headers,
            success: false,
            error_message,
        }
    }

    async fn send_with_retry(&self, request: HttpRequest) -> HttpResponse {
        debug!(method = ?request.method, url = %request.url, "Sending request");
        self.retry.run(|| self.send_once(request.clone())).await
    }

    async fn send_once(&self, request: HttpRequest) -> HttpResponse {
        let raw = match self.executor.execute(request).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Request failed before a response: {}", e);
                return HttpResponse::transport_failure(&e);
            }
        };

        match raw.read_body().await {
            Ok((status, headers, body)) => {
                debug!(status, bytes = body.len(), "Received response");
                HttpResponse::from_parts(status, headers, String::from_utf8_lossy(&body).into_owned())
            }
            Err(e) => HttpResponse::transport_failure(&e),
        }
    }
}

/// Next body chunk, or a timeout error if none arrives within `idle`.
async fn next_chunk(body: &mut ByteStream, idle: Duration) -> Option<Result<Vec<u8>, TransportError>> {
    match tokio::time::timeout(idle, body.next()).await {
        Ok(next) => next,
        Err(_) => Some(Err(TransportError::Timeout(format!("no data received for {:?}", idle)))),
    }
}

fn find_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a String> {
    headers
        .keys()
        .find(|key| key.eq_ignore_ascii_case(name))
}

fn insert_if_missing(headers: &mut Headers, name: &str, value: &str) {
    if find_header(headers, name).is_none() {
        headers.insert(name.to_string(), value.to_string());
    }
}

fn set_header(headers: &mut Headers, name: &str, value: &str) {
    headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value.to_string());
}
