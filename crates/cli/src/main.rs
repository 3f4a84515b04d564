//! lrepl
//!
//! Main entry point for the interactive terminal LLM client.
//! Chats with Groq, OpenAI, Together, Anthropic or a local Ollama model.

mod commands;
mod history;
mod repl;

use clap::Parser;
use lrepl_core::{config::AppConfig, logging, AppResult, ConfigOverrides};
use lrepl_llm::LlmService;
use repl::Repl;
use std::path::PathBuf;

/// lrepl - chat with language models from the terminal
#[derive(Parser, Debug)]
#[command(name = "lrepl")]
#[command(about = "Interactive terminal client for LLM providers", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file (default: ./config.yaml if present)
    #[arg(short, long, env = "LREPL_CONFIG")]
    config: Option<PathBuf>,

    /// LLM provider (groq, openai, together, anthropic, ollama)
    #[arg(short, long, env = "LLM_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long)]
    model: Option<String>,

    /// API key for the provider (overrides config file and environment)
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Sampling temperature (0.0-2.0)
    #[arg(short, long)]
    temperature: Option<f64>,

    /// Maximum tokens in each response
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Print responses only once complete
    #[arg(long)]
    no_stream: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            provider: self.provider.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            log_level: self.log_level.clone(),
            verbose: self.verbose,
            no_color: self.no_color,
            no_stream: self.no_stream,
        }
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Defaults, config file and environment, then CLI overrides
    let config = AppConfig::load(cli.config.as_deref())?.with_overrides(cli.overrides());

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("lrepl starting");
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Config file: {:?}", config.config_file);

    // Missing keys and bad values fail here, before any network call
    config.validate()?;

    let service = LlmService::from_config(&config)?;

    let _span = tracing::info_span!("session", provider = %config.provider).entered();
    let result = Repl::new(service, &config).run().await;

    match &result {
        Ok(_) => tracing::info!("Session ended"),
        Err(e) => tracing::error!("Session failed: {}", e),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "lrepl",
            "-p",
            "ollama",
            "-m",
            "llama3.2",
            "-t",
            "0.2",
            "--max-tokens",
            "512",
            "--no-stream",
            "-v",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.provider.as_deref(), Some("ollama"));
        assert_eq!(overrides.model.as_deref(), Some("llama3.2"));
        assert_eq!(overrides.temperature, Some(0.2));
        assert_eq!(overrides.max_tokens, Some(512));
        assert!(overrides.no_stream);
        assert!(overrides.verbose);
    }

    #[test]
    fn test_cli_rejects_non_numeric_temperature() {
        assert!(Cli::try_parse_from(["lrepl", "--temperature", "hot"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
