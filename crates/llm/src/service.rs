//! Service façade over the active provider.
//!
//! [`LlmService`] is what the REPL talks to. It owns the active adapter and
//! the system prompt, and forwards model and sampling changes to the
//! adapter, which applies its own clamping rules.

use crate::client::LlmClient;
use crate::conversation::Conversation;
use crate::factory::create_client;
use crate::types::{CompletionResult, ModelInfo};
use lrepl_core::{AppConfig, AppResult};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub struct LlmService {
    client: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl LlmService {
    pub fn new(client: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
        }
    }

    /// Build the adapter for the configured provider.
    ///
    /// Fails with a configuration error, before any network call, when the
    /// provider is unknown or its API key is missing.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let provider_config = config.active_provider_config()?;
        let api_key = config.resolve_api_key();
        let client = create_client(&config.provider, &provider_config, api_key.as_deref(), &config.http)?;

        info!(
            provider = client.provider_name(),
            model = %client.current_model(),
            "LLM service ready"
        );
        Ok(Self::new(client, config.repl.system_prompt.clone()))
    }

    pub fn client(&self) -> &Arc<dyn LlmClient> {
        &self.client
    }

    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    /// Complete `conversation` and wait for the result.
    pub async fn complete(&self, conversation: &Conversation) -> CompletionResult {
        self.client.complete(conversation).await
    }

    /// Complete on a background task; the handle resolves to the result.
    ///
    /// A panicked or aborted task can be folded into a failure with
    /// [`CompletionResult::from_join`].
    pub fn complete_async(&self, conversation: Conversation) -> JoinHandle<CompletionResult> {
        let client = Arc::clone(&self.client);
        tokio::spawn(async move { client.complete(&conversation).await })
    }

    /// Stream a completion. `on_chunk` receives each delta and then one
    /// `("", true)`; the result carries the accumulated text. Appending it
    /// to the conversation is left to the caller.
    pub async fn stream_complete<F>(&self, conversation: &Conversation, mut on_chunk: F) -> CompletionResult
    where
        F: FnMut(&str, bool) + Send,
    {
        self.client.stream(conversation, &mut on_chunk).await
    }

    /// One-shot completion of `prompt` under the current system prompt.
    pub async fn complete_prompt(&self, prompt: &str) -> CompletionResult {
        self.complete(&self.one_shot(prompt)).await
    }

    /// One-shot streamed completion of `prompt`.
    pub async fn stream_prompt<F>(&self, prompt: &str, on_chunk: F) -> CompletionResult
    where
        F: FnMut(&str, bool) + Send,
    {
        self.stream_complete(&self.one_shot(prompt), on_chunk).await
    }

    fn one_shot(&self, prompt: &str) -> Conversation {
        let mut conversation = Conversation::with_system_prompt(&self.system_prompt);
        conversation.add_user(prompt);
        conversation
    }

    pub fn set_model(&self, model: &str) {
        self.client.set_model(model);
    }

    pub fn current_model(&self) -> String {
        self.client.current_model()
    }

    pub fn set_temperature(&self, temperature: f64) {
        self.client.set_temperature(temperature);
    }

    pub fn temperature(&self) -> f64 {
        self.client.temperature()
    }

    pub fn set_max_tokens(&self, max_tokens: u32) {
        self.client.set_max_tokens(max_tokens);
    }

    pub fn max_tokens(&self) -> u32 {
        self.client.max_tokens()
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn available_models(&self) -> Vec<ModelInfo> {
        self.client.available_models()
    }

    pub async fn is_available(&self) -> bool {
        self.client.is_available().await
    }

    /// Estimated tokens the conversation may occupy: the model's context
    /// window minus the room reserved for the reply.
    pub fn context_budget(&self) -> usize {
        let context = self.client.context_length();
        context.saturating_sub(self.client.max_tokens()) as usize
    }
}
