//! Anthropic Messages API provider.
//!
//! The Messages API differs from the chat completions shape in three ways:
//! the system prompt is a top-level `system` field instead of a message,
//! authentication uses `x-api-key` plus a pinned `anthropic-version`, and
//! the reply is a list of typed content blocks.
//! API: https://docs.anthropic.com/en/api/messages

use crate::client::{merge_extra_params, parse_completion_body, token_count, LlmClient};
use crate::conversation::{Conversation, Role};
use crate::http::{error_text, Framing, Headers, HttpClient, HttpResponse, StreamDecoder, StreamEvent};
use crate::types::{CompletionResult, GenerationSettings, ModelInfo, SharedSettings};
use lrepl_core::ProviderConfig;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Value of the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const MAX_TOKENS_CAP: u32 = 8192;

const MODELS: &[(&str, &str, u32)] = &[
    ("claude-sonnet-4-5-20250929", "Claude Sonnet 4.5", 200_000),
    ("claude-opus-4-1-20250805", "Claude Opus 4.1", 200_000),
    ("claude-3-5-haiku-20241022", "Claude 3.5 Haiku", 200_000),
];

/// Anthropic Messages API client.
pub struct AnthropicClient {
    transport: HttpClient,
    api_key: String,
    settings: SharedSettings,
    extra_params: BTreeMap<String, String>,
}

impl AnthropicClient {
    /// Create a client. The key is sent as `x-api-key`, not as a bearer token.
    pub fn new(config: &ProviderConfig, api_key: impl Into<String>, transport: HttpClient) -> Self {
        // The Messages API rejects temperatures above 1.0
        let settings = SharedSettings::new(
            GenerationSettings {
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            },
            1.0,
            MAX_TOKENS_CAP,
        );

        Self {
            transport,
            api_key: api_key.into(),
            settings,
            extra_params: config.extra_params.clone(),
        }
    }
}

/// `content_block_delta` text, ending at `message_stop` or an `error` event.
fn anthropic_delta(value: &Value) -> Option<StreamEvent> {
    match value.get("type").and_then(Value::as_str)? {
        "content_block_delta" => value
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .map(|text| StreamEvent::Delta(text.to_string())),
        "message_stop" => Some(StreamEvent::Done),
        "error" => Some(StreamEvent::Error(error_text(&value["error"]))),
        _ => None,
    }
}

#[async_trait::async_trait]
impl LlmClient for AnthropicClient {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    fn transport(&self) -> &HttpClient {
        &self.transport
    }

    fn chat_endpoint(&self) -> &str {
        "/messages"
    }

    fn stream_decoder(&self) -> StreamDecoder {
        StreamDecoder::new(Framing::ServerSentEvents, anthropic_delta)
    }

    fn request_headers(&self) -> Headers {
        Headers::from([
            ("x-api-key".to_string(), self.api_key.clone()),
            ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
        ])
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        MODELS
            .iter()
            .map(|(id, name, context)| ModelInfo::new(id, name, *context))
            .collect()
    }

    fn prepare_request(&self, conversation: &Conversation, stream: bool) -> Value {
        let settings = self.settings.snapshot();
        let messages: Vec<Value> = conversation
            .messages()
            .iter()
            .filter(|m| m.role() != Role::System)
            .map(|m| json!({"role": m.role().as_str(), "content": m.content()}))
            .collect();

        let mut body = json!({
            "model": settings.model,
            "messages": messages,
            "temperature": settings.temperature,
            "max_tokens": settings.max_tokens,
            "stream": stream,
        });

        if let Value::Object(ref mut map) = body {
            if let Some(system) = conversation.system_prompt() {
                map.insert("system".to_string(), Value::from(system));
            }
            merge_extra_params(map, &self.extra_params);
        }
        body
    }

    fn parse_response(&self, response: &HttpResponse) -> CompletionResult {
        parse_completion_body(response, &self.current_model(), |json| {
            let blocks = json.get("content")?.as_array()?;
            let text: String = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();

            let usage = json.get("usage");
            let tokens = token_count(usage.and_then(|u| u.get("input_tokens")))
                .saturating_add(token_count(usage.and_then(|u| u.get("output_tokens"))));
            Some((text, tokens))
        })
    }

    /// Optimistic: there is no free endpoint to probe, so the first real
    /// completion is what reports a bad key or an outage.
    async fn is_available(&self) -> bool {
        true
    }
}
