//! Configuration management for lrepl.
//!
//! Configuration is layered; later layers win:
//! 1. Built-in defaults (one `ProviderConfig` per known provider)
//! 2. YAML config file (`config.yaml` or `--config`)
//! 3. Environment variables (`LLM_PROVIDER`, provider API key variables)
//! 4. Command-line flags (see [`ConfigOverrides`])
//!
//! The one exception is the API key: an explicit key from the command line
//! or the config file beats the provider's environment variable, so a
//! checked-in config can pin a key for a project.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers the client knows how to talk to.
pub const KNOWN_PROVIDERS: &[&str] = &["groq", "openai", "together", "anthropic", "ollama"];

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

const DEFAULT_PROVIDER: &str = "groq";
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Per-provider generation settings and endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Model identifier sent to the provider
    pub model: String,

    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f64,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Base URL of the provider API (endpoint paths are appended)
    pub api_url: String,

    /// Additional request body fields, passed through to the provider
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_params: BTreeMap<String, String>,
}

impl ProviderConfig {
    /// Built-in defaults for a known provider.
    pub fn defaults_for(provider: &str) -> Option<Self> {
        let (model, api_url) = match canonical_provider(provider).as_str() {
            "groq" => ("llama-3.3-70b-versatile", "https://api.groq.com/openai/v1"),
            "openai" => ("gpt-4o-mini", "https://api.openai.com/v1"),
            "together" => (
                "meta-llama/Llama-3.3-70B-Instruct-Turbo",
                "https://api.together.xyz/v1",
            ),
            "anthropic" => ("claude-sonnet-4-5-20250929", "https://api.anthropic.com/v1"),
            "ollama" => ("llama3.1", "http://localhost:11434"),
            _ => return None,
        };

        Some(Self {
            model: model.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_url: api_url.to_string(),
            extra_params: BTreeMap::new(),
        })
    }

    fn merge(&mut self, file: ProviderFileConfig) {
        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(temperature) = file.temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = file.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(api_url) = file.api_url {
            self.api_url = api_url;
        }
        if let Some(extra) = file.extra_params {
            self.extra_params.extend(extra);
        }
    }
}

/// REPL presentation and history settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    pub history_file: String,
    pub max_history: usize,
    pub system_prompt: String,
    pub streaming: bool,
    pub prompt_prefix: String,
    pub ai_prefix: String,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            history_file: "~/.llm_repl_history".to_string(),
            max_history: 100,
            system_prompt: "You are a helpful AI assistant.".to_string(),
            streaming: true,
            prompt_prefix: "> ".to_string(),
            ai_prefix: "AI: ".to_string(),
        }
    }
}

/// Transport settings shared by every provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retry_count: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Config file that was loaded, if any
    pub config_file: Option<PathBuf>,

    /// Active provider name (e.g., "groq", "anthropic", "ollama")
    pub provider: String,

    /// Explicit API key (command line or config file)
    pub api_key: Option<String>,

    /// Settings for every known provider
    pub providers: BTreeMap<String, ProviderConfig>,

    pub repl: ReplConfig,

    pub http: HttpConfig,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// API keys found in provider environment variables at load time
    #[serde(skip)]
    env_api_keys: HashMap<String, String>,
}

/// Full configuration file structure.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    provider: Option<String>,
    api_key: Option<String>,
    #[serde(default)]
    providers: HashMap<String, ProviderFileConfig>,
    repl: Option<ReplConfig>,
    http: Option<HttpConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderFileConfig {
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    api_url: Option<String>,
    extra_params: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

/// Command-line overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub log_level: Option<String>,
    pub verbose: bool,
    pub no_color: bool,
    pub no_stream: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let providers = KNOWN_PROVIDERS
            .iter()
            .filter_map(|name| ProviderConfig::defaults_for(name).map(|c| (name.to_string(), c)))
            .collect();

        Self {
            config_file: None,
            provider: DEFAULT_PROVIDER.to_string(),
            api_key: None,
            providers,
            repl: ReplConfig::default(),
            http: HttpConfig::default(),
            log_level: None,
            verbose: false,
            no_color: false,
            env_api_keys: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and the environment.
    ///
    /// Environment variables:
    /// - `LLM_PROVIDER`: Active provider
    /// - `GROQ_API_KEY`, `OPENAI_API_KEY`, `TOGETHER_API_KEY`, `ANTHROPIC_API_KEY`
    /// - `NO_COLOR`: Disable colored output
    ///
    /// When `config_file` is `None`, `config.yaml` in the working directory
    /// is used if present. An explicitly named file must exist.
    ///
    /// # Example
    /// ```no_run
    /// use lrepl_core::config::AppConfig;
    ///
    /// let config = AppConfig::load(None).expect("Failed to load config");
    /// println!("Provider: {}", config.provider);
    /// ```
    pub fn load(config_file: Option<&Path>) -> AppResult<Self> {
        Self::load_with_env(config_file, |name| std::env::var(name).ok())
    }

    /// Same as [`AppConfig::load`], reading the environment through `env`.
    pub fn load_with_env<F>(config_file: Option<&Path>, env: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let path = match config_file {
            Some(path) => {
                let expanded = PathBuf::from(expand_path(&path.to_string_lossy()));
                if !expanded.exists() {
                    return Err(AppError::Config(format!(
                        "Config file does not exist: {:?}",
                        expanded
                    )));
                }
                Some(expanded)
            }
            None => {
                let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
                candidate.exists().then_some(candidate)
            }
        };

        if let Some(path) = path {
            config.merge_yaml(&path)?;
            tracing::info!("Config loaded from: {:?}", path);
        } else {
            tracing::debug!("No config file found, using defaults");
        }

        if let Some(provider) = env("LLM_PROVIDER").filter(|p| !p.is_empty()) {
            config.provider = provider;
        }

        for provider in KNOWN_PROVIDERS {
            if let Some(var) = api_key_env_var(provider) {
                if let Some(key) = env(var).filter(|k| !k.is_empty()) {
                    config.env_api_keys.insert(provider.to_string(), key);
                }
            }
        }

        if env("NO_COLOR").is_some() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&mut self, path: &Path) -> AppResult<()> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        self.config_file = Some(path.to_path_buf());

        if let Some(provider) = file.provider {
            self.provider = provider;
        }

        if let Some(key) = file.api_key.filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }

        for (name, overrides) in file.providers {
            let name = canonical_provider(&name);
            match ProviderConfig::defaults_for(&name) {
                Some(defaults) => self
                    .providers
                    .entry(name)
                    .or_insert(defaults)
                    .merge(overrides),
                None => tracing::warn!("Ignoring settings for unknown provider '{}'", name),
            }
        }

        if let Some(repl) = file.repl {
            self.repl = repl;
        }

        if let Some(http) = file.http {
            self.http = http;
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
        }

        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Model, temperature and max tokens apply to the provider that is
    /// active *after* the provider override.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(provider) = overrides.provider {
            self.provider = provider;
        }

        if let Some(key) = overrides.api_key.filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }

        let active = canonical_provider(&self.provider);
        if let Some(provider_config) = self.providers.get_mut(&active) {
            if let Some(model) = overrides.model {
                provider_config.model = model;
            }
            if let Some(temperature) = overrides.temperature {
                provider_config.temperature = temperature;
            }
            if let Some(max_tokens) = overrides.max_tokens {
                provider_config.max_tokens = max_tokens;
            }
        }

        if let Some(log_level) = overrides.log_level {
            self.log_level = Some(log_level);
        }

        if overrides.verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if overrides.no_color {
            self.no_color = true;
        }

        if overrides.no_stream {
            self.repl.streaming = false;
        }

        self
    }

    /// Settings for the active provider.
    pub fn active_provider_config(&self) -> AppResult<ProviderConfig> {
        self.provider_config(&self.provider)
    }

    /// Settings for a named provider, falling back to built-in defaults.
    pub fn provider_config(&self, provider: &str) -> AppResult<ProviderConfig> {
        let name = canonical_provider(provider);
        self.providers
            .get(&name)
            .cloned()
            .or_else(|| ProviderConfig::defaults_for(&name))
            .ok_or_else(|| unknown_provider(provider))
    }

    /// Resolve the API key for the active provider.
    ///
    /// Explicit key (CLI or file) first, then the provider's environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        self.env_api_keys
            .get(&canonical_provider(&self.provider))
            .cloned()
    }

    /// Validate configuration for the active provider.
    ///
    /// Runs before any network call; a failure here is a startup failure.
    pub fn validate(&self) -> AppResult<()> {
        let provider = canonical_provider(&self.provider);

        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            return Err(unknown_provider(&self.provider));
        }

        if requires_api_key(&provider) && self.resolve_api_key().is_none() {
            let hint = api_key_env_var(&provider).unwrap_or("the provider's API key variable");
            return Err(AppError::Config(format!(
                "API key is required for {}. Set it via --api-key, the config file, or {}",
                provider, hint
            )));
        }

        let provider_config = self.active_provider_config()?;

        if !(0.0..=2.0).contains(&provider_config.temperature) {
            return Err(AppError::Config(format!(
                "Temperature must be between 0.0 and 2.0, got {}",
                provider_config.temperature
            )));
        }

        if provider_config.max_tokens == 0 {
            return Err(AppError::Config(
                "max_tokens must be greater than zero".to_string(),
            ));
        }

        if provider_config.model.trim().is_empty() {
            return Err(AppError::Config(format!("No model configured for {}", provider)));
        }

        Ok(())
    }
}

/// Normalize a provider name: case and surrounding space are ignored,
/// aliases map to their canonical name.
pub fn canonical_provider(provider: &str) -> String {
    let name = provider.trim().to_lowercase();
    match name.as_str() {
        "claude" => "anthropic".to_string(),
        _ => name,
    }
}

/// Whether a provider refuses requests without an API key.
pub fn requires_api_key(provider: &str) -> bool {
    canonical_provider(provider) != "ollama"
}

/// Environment variable holding the API key for a provider.
pub fn api_key_env_var(provider: &str) -> Option<&'static str> {
    match canonical_provider(provider).as_str() {
        "groq" => Some("GROQ_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        "together" => Some("TOGETHER_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        _ => None,
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"));
        if let Ok(home) = home {
            return format!("{}{}", home, rest);
        }
    }

    path.to_string()
}

fn unknown_provider(provider: &str) -> AppError {
    AppError::Config(format!(
        "Unknown provider: {}. Supported: {}",
        provider,
        KNOWN_PROVIDERS.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "groq");
        assert_eq!(config.providers.len(), KNOWN_PROVIDERS.len());
        assert_eq!(config.repl.max_history, 100);
        assert_eq!(config.http.retry_count, 3);
        assert_eq!(config.http.retry_delay_ms, 1000);
        assert!(!config.verbose);

        let groq = config.provider_config("groq").unwrap();
        assert_eq!(groq.api_url, "https://api.groq.com/openai/v1");
        assert_eq!(groq.temperature, 0.7);
        assert_eq!(groq.max_tokens, 2048);
    }

    #[test]
    fn test_yaml_merges_over_defaults() {
        let file = write_config(
            r#"
provider: ollama
providers:
  ollama:
    model: mistral
    extra_params:
      top_p: "0.9"
  groq:
    temperature: 1.2
repl:
  streaming: false
http:
  retry_count: 5
"#,
        );

        let config = AppConfig::load_with_env(Some(file.path()), no_env).unwrap();
        assert_eq!(config.provider, "ollama");

        let ollama = config.provider_config("ollama").unwrap();
        assert_eq!(ollama.model, "mistral");
        assert_eq!(ollama.api_url, "http://localhost:11434");
        assert_eq!(ollama.extra_params.get("top_p"), Some(&"0.9".to_string()));

        let groq = config.provider_config("groq").unwrap();
        assert_eq!(groq.temperature, 1.2);
        assert_eq!(groq.model, "llama-3.3-70b-versatile");

        assert!(!config.repl.streaming);
        assert_eq!(config.repl.prompt_prefix, "> ");
        assert_eq!(config.http.retry_count, 5);
        assert_eq!(config.http.retry_delay_ms, 1000);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = AppConfig::load_with_env(Some(Path::new("/nonexistent/lrepl.yaml")), no_env);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let file = write_config("provider: [unclosed");
        let result = AppConfig::load_with_env(Some(file.path()), no_env);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_env_provider_overrides_file() {
        let file = write_config("provider: groq\n");
        let config = AppConfig::load_with_env(Some(file.path()), |name| {
            (name == "LLM_PROVIDER").then(|| "openai".to_string())
        })
        .unwrap();
        assert_eq!(config.provider, "openai");
    }

    #[test]
    fn test_api_key_precedence() {
        let env = |name: &str| (name == "GROQ_API_KEY").then(|| "from-env".to_string());

        let config = AppConfig::load_with_env(None, env).unwrap();
        assert_eq!(config.resolve_api_key().as_deref(), Some("from-env"));

        let file = write_config("api_key: from-file\n");
        let config = AppConfig::load_with_env(Some(file.path()), env).unwrap();
        assert_eq!(config.resolve_api_key().as_deref(), Some("from-file"));

        let config = config.with_overrides(ConfigOverrides {
            api_key: Some("from-cli".to_string()),
            ..Default::default()
        });
        assert_eq!(config.resolve_api_key().as_deref(), Some("from-cli"));
    }

    #[test]
    fn test_env_key_follows_provider_override() {
        let env = |name: &str| (name == "ANTHROPIC_API_KEY").then(|| "sk-ant".to_string());
        let config = AppConfig::load_with_env(None, env).unwrap();
        assert!(config.resolve_api_key().is_none());

        let config = config.with_overrides(ConfigOverrides {
            provider: Some("claude".to_string()),
            ..Default::default()
        });
        assert_eq!(config.resolve_api_key().as_deref(), Some("sk-ant"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default().with_overrides(ConfigOverrides {
            provider: Some("openai".to_string()),
            model: Some("gpt-4o".to_string()),
            temperature: Some(0.2),
            max_tokens: Some(512),
            verbose: true,
            no_stream: true,
            ..Default::default()
        });

        assert_eq!(config.provider, "openai");
        let openai = config.active_provider_config().unwrap();
        assert_eq!(openai.model, "gpt-4o");
        assert_eq!(openai.temperature, 0.2);
        assert_eq!(openai.max_tokens, 512);
        assert!(config.verbose);
        assert_eq!(config.log_level, Some("debug".to_string()));
        assert!(!config.repl.streaming);

        // Other providers keep their defaults
        assert_eq!(
            config.provider_config("groq").unwrap().model,
            "llama-3.3-70b-versatile"
        );
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_name_is_case_insensitive() {
        let config = AppConfig::default().with_overrides(ConfigOverrides {
            provider: Some("Groq".to_string()),
            api_key: Some("gsk-test".to_string()),
            model: Some("llama-3.1-8b-instant".to_string()),
            ..Default::default()
        });

        assert!(config.validate().is_ok());
        assert_eq!(config.active_provider_config().unwrap().model, "llama-3.1-8b-instant");

        let mut config = AppConfig::default();
        config.provider = " OLLAMA ".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_api_key() {
        let config = AppConfig::default();
        match config.validate() {
            Err(AppError::Config(msg)) => assert!(msg.contains("GROQ_API_KEY")),
            other => panic!("Expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_ollama_without_key() {
        let mut config = AppConfig::default();
        config.provider = "ollama".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_temperature_range() {
        let config = AppConfig::default().with_overrides(ConfigOverrides {
            provider: Some("ollama".to_string()),
            temperature: Some(3.5),
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("/tmp/history"), "/tmp/history");
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_path("~/.llm_repl_history"), format!("{}/.llm_repl_history", home));
        }
    }

    #[test]
    fn test_provider_aliases() {
        assert_eq!(canonical_provider("claude"), "anthropic");
        assert_eq!(canonical_provider(" Groq "), "groq");
        assert_eq!(canonical_provider("CLAUDE"), "anthropic");
        assert!(!requires_api_key("Ollama"));
        assert!(requires_api_key("claude"));
        assert_eq!(api_key_env_var("together"), Some("TOGETHER_API_KEY"));
    }
}
