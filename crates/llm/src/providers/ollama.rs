//! Ollama LLM provider implementation.
//!
//! This module provides integration with Ollama, a local LLM runtime.
//! It talks to the native chat endpoint rather than the OpenAI shim so
//! that token counts and the `done` marker are available.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{merge_extra_params, parse_completion_body, token_count, LlmClient};
use crate::conversation::Conversation;
use crate::http::{error_text, Framing, HttpClient, HttpResponse, StreamDecoder, StreamEvent};
use crate::types::{CompletionResult, GenerationSettings, ModelInfo, SharedSettings};
use lrepl_core::ProviderConfig;
use serde_json::{json, Value};
use std::collections::BTreeMap;

const MAX_TOKENS_CAP: u32 = 32_768;

const MODELS: &[(&str, &str, u32)] = &[
    ("llama3.1", "Llama 3.1 8B", 131_072),
    ("llama3.2", "Llama 3.2 3B", 131_072),
    ("mistral", "Mistral 7B", 32_768),
    ("qwen2.5", "Qwen 2.5 7B", 32_768),
];

/// Ollama LLM client.
pub struct OllamaClient {
    /// Transport bound to the Ollama base URL
    transport: HttpClient,

    settings: SharedSettings,

    extra_params: BTreeMap<String, String>,
}

impl OllamaClient {
    /// Create a client. Ollama needs no credentials.
    pub fn new(config: &ProviderConfig, transport: HttpClient) -> Self {
        let settings = SharedSettings::new(
            GenerationSettings {
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            },
            2.0,
            MAX_TOKENS_CAP,
        );

        Self {
            transport,
            settings,
            extra_params: config.extra_params.clone(),
        }
    }
}

/// One NDJSON line of `/api/chat` output. The final line has `done: true`
/// and carries statistics rather than content. A failure mid-generation
/// arrives as a line with only an `error` field.
fn ollama_delta(value: &Value) -> Option<StreamEvent> {
    if let Some(error) = value.get("error") {
        return Some(StreamEvent::Error(error_text(error)));
    }

    if value.get("done").and_then(Value::as_bool) == Some(true) {
        return Some(StreamEvent::Done);
    }

    value
        .pointer("/message/content")
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
        .map(|content| StreamEvent::Delta(content.to_string()))
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    fn transport(&self) -> &HttpClient {
        &self.transport
    }

    fn chat_endpoint(&self) -> &str {
        "/api/chat"
    }

    fn stream_decoder(&self) -> StreamDecoder {
        StreamDecoder::new(Framing::NewlineDelimitedJson, ollama_delta)
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        MODELS
            .iter()
            .map(|(id, name, context)| ModelInfo::new(id, name, *context))
            .collect()
    }

    fn prepare_request(&self, conversation: &Conversation, stream: bool) -> Value {
        let settings = self.settings.snapshot();
        let mut options = serde_json::Map::new();
        options.insert("temperature".to_string(), Value::from(settings.temperature));
        options.insert("num_predict".to_string(), Value::from(settings.max_tokens));
        // Sampling knobs belong under `options` for the native API
        merge_extra_params(&mut options, &self.extra_params);

        json!({
            "model": settings.model,
            "messages": conversation.to_wire_format(),
            "stream": stream,
            "options": options,
        })
    }

    fn parse_response(&self, response: &HttpResponse) -> CompletionResult {
        parse_completion_body(response, &self.current_model(), |json| {
            let content = json.pointer("/message/content")?.as_str()?;
            let tokens = token_count(json.get("prompt_eval_count"))
                .saturating_add(token_count(json.get("eval_count")));
            Some((content.to_string(), tokens))
        })
    }

    /// Probes `GET /api/tags`, which lists locally installed models.
    async fn is_available(&self) -> bool {
        let response = self.transport.get("/api/tags", &self.request_headers()).await;
        if !response.success {
            tracing::debug!("Ollama availability check failed: {}", response.error_message);
        }
        response.success
    }
}
