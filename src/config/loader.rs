// src/config/loader.rs

use crate::config::{AppConfig, ApiKeyEntry, ConfigValidator};
use crate::error::{AppError, Result};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load configuration from file (if present) and environment variables
pub fn load_config(config_path: &Path) -> Result<AppConfig> {
    let mut config = if config_path.exists() {
        info!("Loading configuration from file: {}", config_path.display());
        load_from_file(config_path)?
    } else {
        info!("Configuration file not found, using defaults");
        AppConfig::default()
    };

    // Override with environment variables
    override_with_env(&mut config);

    // Validate the final configuration
    ConfigValidator::validate(&config)?;

    debug!(
        keys = config.api_keys.len(),
        allowed_tokens = config.allowed_tokens.len(),
        "Configuration loaded and validated successfully"
    );
    Ok(config)
}

fn load_from_file(config_path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(config_path).map_err(|e| {
        AppError::Config(format!(
            "Failed to read config file {}: {}",
            config_path.display(),
            e
        ))
    })?;

    Ok(serde_yaml::from_str(&content)?)
}

/// Applies environment overrides from the process environment.
pub fn override_with_env(config: &mut AppConfig) {
    apply_overrides(config, |name| std::env::var(name).ok());
}

/// Applies overrides from any variable lookup.
pub fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup("API_KEYS") {
        config.api_keys = parse_json_list::<ApiKeyEntry>("API_KEYS", &raw);
        info!(count = config.api_keys.len(), "Loaded API keys from environment");
    }

    if let Some(raw) = lookup("ALLOWED_TOKENS") {
        config.allowed_tokens = parse_json_list::<String>("ALLOWED_TOKENS", &raw);
        info!(count = config.allowed_tokens.len(), "Loaded allowed tokens from environment");
    }

    if let Some(token) = lookup("AUTH_TOKEN") {
        config.auth_token = Some(token);
    }
    if config.auth_token.as_deref().map_or(true, str::is_empty) {
        config.auth_token = config.allowed_tokens.first().cloned();
    }

    if let Some(raw) = lookup("AVAILABLE_MODELS") {
        config.available_models = parse_json_list::<String>("AVAILABLE_MODELS", &raw);
    }

    if let Some(base_url) = lookup("BASE_URL") {
        info!("Overriding default base URL from environment variable");
        config.default_base_url = base_url;
    }

    if let Some(port_str) = lookup("PORT") {
        if let Ok(port) = port_str.parse::<u16>() {
            info!("Overriding server port from environment variable: {}", port);
            config.server.port = port;
        } else {
            warn!("Invalid PORT environment variable: {}", port_str);
        }
    }

    if let Some(attempts_str) = lookup("MAX_ATTEMPTS") {
        if let Ok(attempts) = attempts_str.parse::<u32>() {
            info!("Overriding max attempts from environment: {}", attempts);
            config.retry.max_attempts = Some(attempts);
        } else {
            warn!("Invalid MAX_ATTEMPTS environment variable: {}", attempts_str);
        }
    }

    if let Some(threshold_str) = lookup("MAX_FAILURES_THRESHOLD") {
        if let Ok(threshold) = threshold_str.parse::<u32>() {
            info!("Overriding max failures threshold from environment: {}", threshold);
            config.retry.max_failures_threshold = threshold;
        } else {
            warn!("Invalid MAX_FAILURES_THRESHOLD environment variable: {}", threshold_str);
        }
    }
}

fn parse_json_list<T: DeserializeOwned>(name: &str, raw: &str) -> Vec<T> {
    match serde_json::from_str::<Vec<T>>(raw) {
        Ok(items) => items,
        Err(e) => {
            warn!(variable = name, error = %e, "Failed to parse JSON list, using an empty list");
            Vec::new()
        }
    }
}
