//! OpenAI-compatible chat completions provider.
//!
//! Groq, OpenAI and Together all expose the same `/chat/completions` shape
//! and authenticate with a bearer token; they differ only in base URL,
//! model catalog and output cap, which live in an [`OpenAiProfile`].
//! API: https://platform.openai.com/docs/api-reference/chat

use crate::client::{merge_extra_params, parse_completion_body, token_count, LlmClient};
use crate::conversation::Conversation;
use crate::http::{HttpClient, HttpResponse, StreamDecoder};
use crate::types::{CompletionResult, GenerationSettings, ModelInfo, SharedSettings};
use lrepl_core::ProviderConfig;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Static facts about one OpenAI-compatible service.
#[derive(Debug, Clone, Copy)]
pub struct OpenAiProfile {
    pub name: &'static str,
    pub max_tokens_cap: u32,
    /// `(id, display name, context length)`
    pub models: &'static [(&'static str, &'static str, u32)],
}

pub const GROQ: OpenAiProfile = OpenAiProfile {
    name: "groq",
    max_tokens_cap: 8192,
    models: &[
        ("llama-3.3-70b-versatile", "Llama 3.3 70B", 131_072),
        ("llama-3.1-70b-versatile", "Llama 3.1 70B", 131_072),
        ("llama-3.1-8b-instant", "Llama 3.1 8B", 131_072),
        ("mixtral-8x7b-32768", "Mixtral 8x7B", 32_768),
        ("gemma2-9b-it", "Gemma 2 9B", 8192),
    ],
};

pub const OPENAI: OpenAiProfile = OpenAiProfile {
    name: "openai",
    max_tokens_cap: 16_384,
    models: &[
        ("gpt-4o-mini", "GPT-4o mini", 128_000),
        ("gpt-4o", "GPT-4o", 128_000),
        ("gpt-4-turbo", "GPT-4 Turbo", 128_000),
        ("gpt-3.5-turbo", "GPT-3.5 Turbo", 16_385),
    ],
};

pub const TOGETHER: OpenAiProfile = OpenAiProfile {
    name: "together",
    max_tokens_cap: 8192,
    models: &[
        (
            "meta-llama/Llama-3.3-70B-Instruct-Turbo",
            "Llama 3.3 70B Instruct Turbo",
            131_072,
        ),
        (
            "meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo",
            "Llama 3.1 8B Instruct Turbo",
            131_072,
        ),
        (
            "mistralai/Mixtral-8x7B-Instruct-v0.1",
            "Mixtral 8x7B Instruct",
            32_768,
        ),
        ("Qwen/Qwen2.5-72B-Instruct-Turbo", "Qwen 2.5 72B Instruct Turbo", 32_768),
    ],
};

/// Chat completions client for an OpenAI-compatible service.
pub struct OpenAiCompatClient {
    profile: OpenAiProfile,
    transport: HttpClient,
    settings: SharedSettings,
    extra_params: BTreeMap<String, String>,
}

impl OpenAiCompatClient {
    /// Create a client. `transport` must already carry the bearer token.
    pub fn new(profile: OpenAiProfile, config: &ProviderConfig, transport: HttpClient) -> Self {
        let settings = SharedSettings::new(
            GenerationSettings {
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            },
            2.0,
            profile.max_tokens_cap,
        );

        Self {
            profile,
            transport,
            settings,
            extra_params: config.extra_params.clone(),
        }
    }

    pub fn profile(&self) -> &OpenAiProfile {
        &self.profile
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiCompatClient {
    fn provider_name(&self) -> &str {
        self.profile.name
    }

    fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    fn transport(&self) -> &HttpClient {
        &self.transport
    }

    fn chat_endpoint(&self) -> &str {
        "/chat/completions"
    }

    fn stream_decoder(&self) -> StreamDecoder {
        StreamDecoder::openai_sse()
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        self.profile
            .models
            .iter()
            .map(|(id, name, context)| ModelInfo::new(id, name, *context))
            .collect()
    }

    fn prepare_request(&self, conversation: &Conversation, stream: bool) -> Value {
        let settings = self.settings.snapshot();
        let mut body = json!({
            "model": settings.model,
            "messages": conversation.to_wire_format(),
            "temperature": settings.temperature,
            "max_tokens": settings.max_tokens,
            "stream": stream,
        });

        if let Value::Object(ref mut map) = body {
            merge_extra_params(map, &self.extra_params);
        }
        body
    }

    fn parse_response(&self, response: &HttpResponse) -> CompletionResult {
        parse_completion_body(response, &self.current_model(), |json| {
            let content = json.pointer("/choices/0/message/content")?.as_str()?;
            Some((content.to_string(), token_count(json.pointer("/usage/total_tokens"))))
        })
    }

    /// Probes `GET /models`, which every compatible service implements.
    async fn is_available(&self) -> bool {
        let response = self.transport.get("/models", &self.request_headers()).await;
        if !response.success {
            tracing::debug!("{} availability check failed: {}", self.profile.name, response.error_message);
        }
        response.success
    }
}
