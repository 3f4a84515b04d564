//! LLM integration crate for the lrepl terminal client.
//!
//! This crate provides a provider-agnostic way to send conversations to
//! hosted and local language models:
//!
//! - [`http`]: transport with timeout, retry with exponential backoff, and
//!   incremental decoding of streamed responses
//! - [`providers`]: adapters translating a [`Conversation`] to and from each
//!   provider's wire format, behind the [`LlmClient`] trait
//! - [`conversation`]: the ordered, role-tagged message list
//! - [`service`]: the façade the REPL drives
//!
//! # Providers
//! - **Groq**, **OpenAI**, **Together**: OpenAI-compatible chat completions
//! - **Anthropic**: Messages API
//! - **Ollama**: local runtime, native chat API
//!
//! # Example
//! ```no_run
//! use lrepl_core::AppConfig;
//! use lrepl_llm::{Conversation, LlmService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load(None)?;
//! let service = LlmService::from_config(&config)?;
//!
//! let mut conversation = Conversation::with_system_prompt(service.system_prompt());
//! conversation.add_user("Hello, world!");
//! let result = service.complete(&conversation).await;
//! if result.success {
//!     println!("{}", result.content);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod conversation;
pub mod factory;
pub mod http;
pub mod providers;
pub mod service;
pub mod types;

// Re-export main types
pub use client::{ChunkCallback, LlmClient, DEFAULT_CONTEXT_LENGTH};
pub use conversation::{Conversation, Message, Role, DEFAULT_KEEP_RECENT};
pub use factory::{create_client, create_client_with_transport};
pub use http::{HttpClient, HttpResponse};
pub use providers::{AnthropicClient, OllamaClient, OpenAiCompatClient};
pub use service::LlmService;
pub use types::{CompletionResult, GenerationSettings, ModelInfo, ProviderType, SharedSettings};
