//! lrepl Core Library
//!
//! This crate provides the foundational utilities for the lrepl terminal client:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Layered configuration (defaults, YAML file, environment, CLI)

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, ConfigOverrides, HttpConfig, ProviderConfig, ReplConfig};
pub use error::{AppError, AppResult};
