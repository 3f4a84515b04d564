//! Provider adapters.

pub mod anthropic;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use ollama::OllamaClient;
pub use openai::{OpenAiCompatClient, OpenAiProfile, GROQ, OPENAI, TOGETHER};
