// src/config/validation.rs

use crate::config::AppConfig;
use crate::core::key_state::preview_key;
use crate::error::{AppError, Result};
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig) -> Result<()> {
        debug!("Starting configuration validation");

        if let Err(e) = Self::validate_keys(config) {
            warn!("API key validation failed: {}", e);
            return Err(e);
        }
        debug!("API key validation passed");

        if let Err(e) = Self::validate_access_tokens(config) {
            warn!("Access token validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_server_config(config) {
            warn!("Server config validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_retry_config(config) {
            warn!("Retry config validation failed: {}", e);
            return Err(e);
        }

        debug!("Configuration validation completed successfully");
        Ok(())
    }

    fn validate_keys(config: &AppConfig) -> Result<()> {
        if config.api_keys.is_empty() {
            return Err(AppError::config_validation(
                "At least one API key must be configured",
                Some("api_keys"),
            ));
        }

        Self::validate_url(&config.default_base_url, "default_base_url")?;

        let mut seen = HashSet::new();
        for key in config.key_configs() {
            let secret = secrecy::ExposeSecret::expose_secret(&key.key);
            if secret.is_empty() {
                return Err(AppError::config_validation(
                    "API key cannot be empty",
                    Some("api_keys"),
                ));
            }
            if !seen.insert(secret.clone()) {
                return Err(AppError::config_validation(
                    format!("Duplicate API key found: {}", preview_key(secret)),
                    Some("api_keys"),
                ));
            }
            Self::validate_url(&key.base_url, "api_keys.base_url")?;
        }

        debug!("Validated {} API keys", seen.len());
        Ok(())
    }

    fn validate_access_tokens(config: &AppConfig) -> Result<()> {
        if config.access_tokens().is_empty() {
            return Err(AppError::config_validation(
                "At least one allowed token or auth token must be configured",
                Some("allowed_tokens"),
            ));
        }
        Ok(())
    }

    fn validate_server_config(config: &AppConfig) -> Result<()> {
        if config.server.port == 0 {
            return Err(AppError::config_validation(
                "Server port cannot be 0",
                Some("server.port"),
            ));
        }

        if config.server.connect_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Connect timeout cannot be 0",
                Some("server.connect_timeout_secs"),
            ));
        }

        Ok(())
    }

    fn validate_retry_config(config: &AppConfig) -> Result<()> {
        if config.retry.max_attempts == Some(0) {
            return Err(AppError::config_validation(
                "max_attempts must be at least 1",
                Some("retry.max_attempts"),
            ));
        }

        if config.retry.attempt_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Attempt timeout cannot be 0",
                Some("retry.attempt_timeout_secs"),
            ));
        }

        if config.retry.stream_idle_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Stream idle timeout cannot be 0",
                Some("retry.stream_idle_timeout_secs"),
            ));
        }

        if config.retry.max_failures_threshold == 0 {
            return Err(AppError::config_validation(
                "max_failures_threshold must be at least 1",
                Some("retry.max_failures_threshold"),
            ));
        }

        Ok(())
    }

    fn validate_url(url_str: &str, field_name: &str) -> Result<()> {
        let url = Url::parse(url_str).map_err(|e| {
            AppError::config_validation(
                format!("Invalid URL in {}: {} - {}", field_name, url_str, e),
                Some(field_name),
            )
        })?;

        match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(AppError::config_validation(
                format!("Unsupported scheme '{}' in {}. Supported: http, https", scheme, field_name),
                Some(field_name),
            )),
        }
    }
}
