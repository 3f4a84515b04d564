//! Normalized completion types shared by every provider.

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

/// Result of one completion call. Failures are values, not errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    /// The generated text
    pub content: String,

    pub success: bool,

    /// Human-readable reason when `success` is false
    pub error_message: String,

    /// Tokens reported by the provider, 0 when unknown
    pub tokens_used: u32,

    /// Model id the request was sent with
    pub model_used: String,
}

impl CompletionResult {
    pub fn success(content: impl Into<String>, tokens_used: u32, model_used: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            success: true,
            error_message: String::new(),
            tokens_used,
            model_used: model_used.into(),
        }
    }

    pub fn failure(error_message: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            success: false,
            error_message: error_message.into(),
            tokens_used: 0,
            model_used: String::new(),
        }
    }

    /// Attach the model the failed request targeted.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_used = model.into();
        self
    }

    /// Fold the outcome of a spawned completion into a result.
    pub fn from_join(joined: Result<CompletionResult, tokio::task::JoinError>) -> Self {
        match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Self::failure("Request cancelled"),
            Err(e) => Self::failure(format!("Request task failed: {}", e)),
        }
    }
}

/// Catalog entry for a model a provider is known to serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub display_name: String,
    pub context_length: u32,
    pub supports_streaming: bool,
}

impl ModelInfo {
    pub fn new(id: &str, display_name: &str, context_length: u32) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            context_length,
            supports_streaming: true,
        }
    }
}

/// Model and sampling parameters sent with each request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Generation settings behind a lock, with the provider's clamping rules.
///
/// Adapters are shared as `Arc<dyn LlmClient>`, so setters take `&self`.
#[derive(Debug)]
pub struct SharedSettings {
    inner: RwLock<GenerationSettings>,
    max_temperature: f64,
    max_tokens_cap: u32,
}

impl SharedSettings {
    /// Wrap `initial`, clamping it to the given limits.
    pub fn new(initial: GenerationSettings, max_temperature: f64, max_tokens_cap: u32) -> Self {
        let settings = Self {
            inner: RwLock::new(initial.clone()),
            max_temperature,
            max_tokens_cap,
        };
        settings.set_temperature(initial.temperature);
        settings.set_max_tokens(initial.max_tokens);
        settings
    }

    pub fn snapshot(&self) -> GenerationSettings {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn model(&self) -> String {
        self.snapshot().model
    }

    pub fn temperature(&self) -> f64 {
        self.snapshot().temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.snapshot().max_tokens
    }

    pub fn max_tokens_cap(&self) -> u32 {
        self.max_tokens_cap
    }

    pub fn max_temperature(&self) -> f64 {
        self.max_temperature
    }

    pub fn set_model(&self, model: &str) {
        self.write(|s| s.model = model.to_string());
    }

    /// Clamp to `[0, max_temperature]`; NaN is ignored.
    pub fn set_temperature(&self, temperature: f64) {
        if temperature.is_nan() {
            tracing::warn!("Ignoring NaN temperature");
            return;
        }
        let clamped = temperature.clamp(0.0, self.max_temperature);
        if clamped != temperature {
            tracing::warn!("Temperature {} clamped to {}", temperature, clamped);
        }
        self.write(|s| s.temperature = clamped);
    }

    /// Clamp to `[1, max_tokens_cap]`.
    pub fn set_max_tokens(&self, max_tokens: u32) {
        let clamped = max_tokens.clamp(1, self.max_tokens_cap.max(1));
        if clamped != max_tokens {
            tracing::warn!("max_tokens {} clamped to {}", max_tokens, clamped);
        }
        self.write(|s| s.max_tokens = clamped);
    }

    fn write(&self, update: impl FnOnce(&mut GenerationSettings)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut guard);
    }
}

/// Provider type enum for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Groq,
    OpenAI,
    Together,
    Anthropic,
    Ollama,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Some(Self::Groq),
            "openai" => Some(Self::OpenAI),
            "together" => Some(Self::Together),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenAI => "openai",
            Self::Together => "together",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SharedSettings {
        SharedSettings::new(
            GenerationSettings {
                model: "m".to_string(),
                temperature: 0.7,
                max_tokens: 2048,
            },
            2.0,
            8192,
        )
    }

    #[test]
    fn test_provider_type_parsing() {
        assert_eq!(ProviderType::parse("groq"), Some(ProviderType::Groq));
        assert_eq!(ProviderType::parse("OpenAI"), Some(ProviderType::OpenAI));
        assert_eq!(ProviderType::parse("claude"), Some(ProviderType::Anthropic));
        assert_eq!(ProviderType::parse("anthropic"), Some(ProviderType::Anthropic));
        assert_eq!(ProviderType::parse("ollama"), Some(ProviderType::Ollama));
        assert_eq!(ProviderType::parse("gguf"), None);
        assert_eq!(ProviderType::Anthropic.to_string(), "anthropic");
    }

    #[test]
    fn test_temperature_is_clamped() {
        let s = settings();
        s.set_temperature(3.5);
        assert_eq!(s.temperature(), 2.0);
        s.set_temperature(-1.0);
        assert_eq!(s.temperature(), 0.0);
        s.set_temperature(f64::NAN);
        assert_eq!(s.temperature(), 0.0);
        s.set_temperature(0.7);
        assert_eq!(s.temperature(), 0.7);
    }

    #[test]
    fn test_max_tokens_is_capped() {
        let s = settings();
        s.set_max_tokens(100_000);
        assert_eq!(s.max_tokens(), 8192);
        s.set_max_tokens(0);
        assert_eq!(s.max_tokens(), 1);
    }

    #[test]
    fn test_initial_values_are_clamped() {
        let s = SharedSettings::new(
            GenerationSettings {
                model: "m".to_string(),
                temperature: 1.5,
                max_tokens: 50_000,
            },
            1.0,
            4096,
        );
        assert_eq!(s.temperature(), 1.0);
        assert_eq!(s.max_tokens(), 4096);
    }

    #[test]
    fn test_result_constructors() {
        let ok = CompletionResult::success("hi", 5, "m");
        assert!(ok.success);
        assert!(ok.error_message.is_empty());

        let err = CompletionResult::failure("boom").with_model("m");
        assert!(!err.success);
        assert_eq!(err.error_message, "boom");
        assert_eq!(err.model_used, "m");
    }

    #[tokio::test]
    async fn test_from_join_reports_cancellation() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            CompletionResult::success("late", 0, "m")
        });
        handle.abort();
        let result = CompletionResult::from_join(handle.await);
        assert!(!result.success);
        assert_eq!(result.error_message, "Request cancelled");
    }
}
