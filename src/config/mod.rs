// src/config/mod.rs

pub mod app;
pub mod loader;
pub mod validation;

pub use app::{ApiKeyEntry, AppConfig, KeyConfig, RetryConfig, ServerConfig, StatusConfig};
pub use loader::{apply_overrides, load_config, override_with_env};
pub use validation::ConfigValidator;
