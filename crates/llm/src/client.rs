//! LLM client abstraction.
//!
//! This module defines the [`LlmClient`] trait every provider adapter
//! implements. An adapter owns its transport and generation settings and
//! knows two things about its provider: how to serialize a conversation
//! into a request body, and how to read a completion back out of the
//! response. The provided `complete` and `stream` methods wire those
//! halves to the transport.

use crate::conversation::Conversation;
use crate::http::{Headers, HttpClient, HttpResponse, StreamDecoder};
use crate::types::{CompletionResult, ModelInfo, SharedSettings};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Context window assumed for models missing from a provider's catalog.
pub const DEFAULT_CONTEXT_LENGTH: u32 = 8192;

/// Callback receiving `(chunk, is_done)` during a streamed completion.
pub type ChunkCallback<'a> = dyn FnMut(&str, bool) + Send + 'a;

/// Trait for LLM providers.
///
/// This trait abstracts the underlying provider (Groq, OpenAI, Together,
/// Anthropic, Ollama) behind a unified interface. Nothing here returns an
/// error: failures surface as [`CompletionResult`]s with `success == false`.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Get the provider name (e.g., "groq", "ollama").
    fn provider_name(&self) -> &str;

    /// Current generation settings and the provider's limits.
    fn settings(&self) -> &SharedSettings;

    /// Transport bound to the provider's base URL.
    fn transport(&self) -> &HttpClient;

    /// Path of the completion endpoint, relative to the base URL.
    fn chat_endpoint(&self) -> &str;

    /// Decoder for this provider's streaming format.
    fn stream_decoder(&self) -> StreamDecoder;

    /// Static catalog of models this provider is known to serve.
    fn available_models(&self) -> Vec<ModelInfo>;

    /// Serialize `conversation` with the current settings.
    fn prepare_request(&self, conversation: &Conversation, stream: bool) -> Value;

    /// Turn a transport response into a completion result.
    fn parse_response(&self, response: &HttpResponse) -> CompletionResult;

    /// Liveness probe.
    async fn is_available(&self) -> bool;

    /// Provider-specific headers added to every request.
    fn request_headers(&self) -> Headers {
        Headers::new()
    }

    /// Switch models. Any non-empty id is accepted; ids missing from the
    /// catalog only produce a warning.
    fn set_model(&self, model: &str) {
        let model = model.trim();
        if model.is_empty() {
            warn!("Ignoring empty model id");
            return;
        }

        if !self.available_models().iter().any(|m| m.id == model) {
            warn!(
                "Model '{}' is not in the {} catalog, using it anyway",
                model,
                self.provider_name()
            );
        }

        self.settings().set_model(model);
        info!("Switched to model: {}", model);
    }

    fn current_model(&self) -> String {
        self.settings().model()
    }

    fn set_temperature(&self, temperature: f64) {
        self.settings().set_temperature(temperature);
    }

    fn temperature(&self) -> f64 {
        self.settings().temperature()
    }

    fn set_max_tokens(&self, max_tokens: u32) {
        self.settings().set_max_tokens(max_tokens);
    }

    fn max_tokens(&self) -> u32 {
        self.settings().max_tokens()
    }

    /// Context window of the current model.
    fn context_length(&self) -> u32 {
        let model = self.current_model();
        self.available_models()
            .into_iter()
            .find(|m| m.id == model)
            .map(|m| m.context_length)
            .unwrap_or(DEFAULT_CONTEXT_LENGTH)
    }

    /// Perform a non-streaming completion.
    async fn complete(&self, conversation: &Conversation) -> CompletionResult {
        let body = self.prepare_request(conversation, false);
        debug!(provider = self.provider_name(), "Sending completion request");

        let response = self
            .transport()
            .post(self.chat_endpoint(), &body, &self.request_headers())
            .await;

        self.parse_response(&response)
    }

    /// Perform a streaming completion.
    ///
    /// `on_chunk` sees every delta in order and then exactly one
    /// `("", true)`. The returned result carries the accumulated text.
    async fn stream(&self, conversation: &Conversation, on_chunk: &mut ChunkCallback<'_>) -> CompletionResult {
        let body = self.prepare_request(conversation, true);
        let model = self.current_model();
        debug!(provider = self.provider_name(), "Sending streaming request");

        let mut content = String::new();
        let response = self
            .transport()
            .post_stream_with(
                self.chat_endpoint(),
                &body,
                &self.request_headers(),
                self.stream_decoder(),
                |chunk, done| {
                    if !done {
                        content.push_str(chunk);
                    }
                    on_chunk(chunk, done);
                },
            )
            .await;

        if response.success {
            CompletionResult::success(content, 0, model)
        } else {
            CompletionResult::failure(response.error_message).with_model(model)
        }
    }
}

/// Shared response handling: transport failures pass through verbatim,
/// unparseable bodies and unexpected shapes become failure results.
///
/// `extract` returns the content and token count, or `None` if the body
/// does not have the expected shape.
pub(crate) fn parse_completion_body<F>(response: &HttpResponse, model: &str, extract: F) -> CompletionResult
where
    F: FnOnce(&Value) -> Option<(String, u32)>,
{
    if !response.success {
        return CompletionResult::failure(response.error_message.clone()).with_model(model);
    }

    let json: Value = match serde_json::from_str(&response.body) {
        Ok(json) => json,
        Err(e) => {
            warn!("Unparseable completion body: {}", e);
            return CompletionResult::failure(format!("JSON parsing error: {}", e)).with_model(model);
        }
    };

    match extract(&json) {
        Some((content, tokens)) => CompletionResult::success(content, tokens, model),
        None => {
            warn!("Completion body has an unexpected shape");
            CompletionResult::failure("Invalid response format").with_model(model)
        }
    }
}

/// Read a token count that may be absent or out of range.
pub(crate) fn token_count(value: Option<&Value>) -> u32 {
    value
        .and_then(Value::as_u64)
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

/// Append configured extra parameters to a request body.
///
/// Values that look like booleans or numbers are sent as such. Keys the
/// adapter already set are left alone.
pub(crate) fn merge_extra_params(body: &mut Map<String, Value>, extra: &BTreeMap<String, String>) {
    for (key, raw) in extra {
        if body.contains_key(key) {
            debug!("Extra parameter '{}' conflicts with a core field, skipping", key);
            continue;
        }
        body.insert(key.clone(), coerce_param(raw));
    }
}

fn coerce_param(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}
