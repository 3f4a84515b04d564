//! Error types for the lrepl terminal client.
//!
//! This module defines the unified error enum used at the edges of the
//! application: configuration loading, provider construction, file I/O and
//! serialization. Per-request network and provider failures are *not*
//! errors in this sense; they are reported through `HttpResponse` and
//! `CompletionResult` values by the `lrepl-llm` crate.

use thiserror::Error;

/// Unified error type for lrepl.
///
/// Startup and I/O paths return `Result<T, AppError>`.
/// Errors are propagated, never panicked on.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (unknown provider, missing API key, bad file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// LLM provider errors that escape the completion result path
    #[error("Provider error: {0}")]
    Provider(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = AppError::Config("API key is required for groq".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: API key is required for groq"
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
