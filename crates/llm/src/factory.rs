//! LLM provider factory.
//!
//! This module creates LLM clients from configuration. It resolves the
//! provider name, checks for required credentials and builds a transport
//! configured with the HTTP timeout and retry settings.

use crate::client::LlmClient;
use crate::http::HttpClient;
use crate::providers::{AnthropicClient, OllamaClient, OpenAiCompatClient, GROQ, OPENAI, TOGETHER};
use crate::types::ProviderType;
use lrepl_core::config::{api_key_env_var, KNOWN_PROVIDERS};
use lrepl_core::{AppError, AppResult, HttpConfig, ProviderConfig};
use std::sync::Arc;
use std::time::Duration;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("groq", "openai", "together", "anthropic"/"claude", "ollama")
/// * `config` - Model, sampling settings and base URL for that provider
/// * `api_key` - API key (required by every provider except Ollama)
/// * `http` - Timeout and retry settings for the transport
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or a required key
/// is missing. No network call is made.
pub fn create_client(
    provider: &str,
    config: &ProviderConfig,
    api_key: Option<&str>,
    http: &HttpConfig,
) -> AppResult<Arc<dyn LlmClient>> {
    let mut transport = HttpClient::new(config.api_url.clone(), Duration::from_secs(http.timeout_secs));
    transport.set_retry_count(http.retry_count);
    transport.set_retry_delay(Duration::from_millis(http.retry_delay_ms));

    create_client_with_transport(provider, config, api_key, transport)
}

/// Like [`create_client`], over a caller-built transport.
pub fn create_client_with_transport(
    provider: &str,
    config: &ProviderConfig,
    api_key: Option<&str>,
    mut transport: HttpClient,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider).ok_or_else(|| {
        AppError::Config(format!(
            "Unknown provider: {}. Supported: {}",
            provider,
            KNOWN_PROVIDERS.join(", ")
        ))
    })?;

    let api_key = api_key.map(str::trim).filter(|key| !key.is_empty());
    let require_key = || {
        api_key.ok_or_else(|| {
            AppError::Config(format!(
                "{} provider requires an API key (set {} or pass --api-key)",
                provider_type,
                api_key_env_var(provider_type.as_str()).unwrap_or("an API key")
            ))
        })
    };

    tracing::debug!(provider = %provider_type, base_url = %config.api_url, "Creating LLM client");

    let client: Arc<dyn LlmClient> = match provider_type {
        ProviderType::Groq | ProviderType::OpenAI | ProviderType::Together => {
            transport.set_bearer_token(require_key()?);
            let profile = match provider_type {
                ProviderType::Groq => GROQ,
                ProviderType::OpenAI => OPENAI,
                _ => TOGETHER,
            };
            Arc::new(OpenAiCompatClient::new(profile, config, transport))
        }
        ProviderType::Anthropic => Arc::new(AnthropicClient::new(config, require_key()?, transport)),
        ProviderType::Ollama => Arc::new(OllamaClient::new(config, transport)),
    };

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults(provider: &str) -> ProviderConfig {
        ProviderConfig::defaults_for(provider).unwrap()
    }

    #[test]
    fn test_create_ollama_client() {
        let client = create_client("ollama", &defaults("ollama"), None, &HttpConfig::default()).unwrap();
        assert_eq!(client.provider_name(), "ollama");
        assert_eq!(client.transport().base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_create_openai_compatible_clients() {
        for name in ["groq", "openai", "together"] {
            let client = create_client(name, &defaults(name), Some("key"), &HttpConfig::default()).unwrap();
            assert_eq!(client.provider_name(), name);
            assert_eq!(client.current_model(), defaults(name).model);
        }
    }

    #[test]
    fn test_claude_alias() {
        let client =
            create_client("claude", &defaults("anthropic"), Some("key"), &HttpConfig::default()).unwrap();
        assert_eq!(client.provider_name(), "anthropic");
    }

    #[test]
    fn test_http_settings_are_applied() {
        let http = HttpConfig {
            timeout_secs: 5,
            retry_count: 1,
            retry_delay_ms: 250,
        };
        let client = create_client("groq", &defaults("groq"), Some("key"), &http).unwrap();
        let policy = client.transport().retry_policy();
        assert_eq!(policy.retry_count, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(client.transport().timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_groq_requires_api_key() {
        match create_client("groq", &defaults("groq"), None, &HttpConfig::default()) {
            Err(AppError::Config(msg)) => assert!(msg.contains("GROQ_API_KEY")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("Expected error for Groq without API key"),
        }
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        assert!(create_client("anthropic", &defaults("anthropic"), Some("  "), &HttpConfig::default()).is_err());
    }

    #[test]
    fn test_unknown_provider() {
        match create_client("unknown", &defaults("groq"), Some("k"), &HttpConfig::default()) {
            Err(err) => assert!(err.to_string().contains("Unknown provider")),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }
}
