// src/config/app.rs

use secrecy::Secret;
use serde::{Deserialize, Serialize};

/// An API key as written in configuration: a bare string, or an object
/// overriding the base URL for that key.
#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ApiKeyEntry {
    Plain(String),
    Detailed {
        key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
}

impl ApiKeyEntry {
    pub fn key(&self) -> &str {
        match self {
            Self::Plain(key) | Self::Detailed { key, .. } => key,
        }
    }
}

/// A key normalized for the pool.
#[derive(Debug, Clone)]
pub struct KeyConfig {
    pub key: Secret<String>,
    pub base_url: String,
}

impl KeyConfig {
    pub fn new(key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            key: Secret::new(key.into()),
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct RetryConfig {
    /// Attempts per request. Defaults to the number of keys.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    /// Longest gap between two chunks of a committed stream.
    #[serde(default = "default_stream_idle_timeout")]
    pub stream_idle_timeout_secs: u64,
    #[serde(default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown_secs: u64,
    /// Upper bound for a `Retry-After` sent by the upstream.
    #[serde(default = "default_max_cooldown")]
    pub max_cooldown_secs: u64,
    /// Consecutive transient failures tolerated; one more marks the key invalid.
    #[serde(default = "default_max_failures_threshold")]
    pub max_failures_threshold: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            attempt_timeout_secs: default_attempt_timeout(),
            stream_idle_timeout_secs: default_stream_idle_timeout(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown(),
            max_cooldown_secs: default_max_cooldown(),
            max_failures_threshold: default_max_failures_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default, Serialize)]
pub struct StatusConfig {
    /// Show full keys on the status endpoint instead of previews.
    #[serde(default)]
    pub expose_full_keys: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
    #[serde(default = "default_base_url")]
    pub default_base_url: String,
    #[serde(default)]
    pub allowed_tokens: Vec<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// When non-empty, the model list is filtered down to these ids.
    #[serde(default)]
    pub available_models: Vec<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            api_keys: Vec::new(),
            default_base_url: default_base_url(),
            allowed_tokens: Vec::new(),
            auth_token: None,
            available_models: Vec::new(),
            retry: RetryConfig::default(),
            status: StatusConfig::default(),
        }
    }
}

impl AppConfig {
    /// Keys in configuration order, each with its effective base URL.
    pub fn key_configs(&self) -> Vec<KeyConfig> {
        self.api_keys
            .iter()
            .map(|entry| match entry {
                ApiKeyEntry::Plain(key) => KeyConfig::new(key.trim(), &self.default_base_url),
                ApiKeyEntry::Detailed { key, base_url } => KeyConfig::new(
                    key.trim(),
                    base_url.as_deref().unwrap_or(&self.default_base_url),
                ),
            })
            .collect()
    }

    /// Bearer tokens accepted from clients: the allowed list plus the
    /// auth token, which defaults to the first allowed token.
    pub fn access_tokens(&self) -> Vec<String> {
        let mut tokens = self.allowed_tokens.clone();
        if let Some(auth_token) = self.auth_token.as_ref().filter(|t| !t.is_empty()) {
            if !tokens.contains(auth_token) {
                tokens.push(auth_token.clone());
            }
        }
        tokens.retain(|t| !t.is_empty());
        tokens
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7860
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_attempt_timeout() -> u64 {
    120
}

fn default_stream_idle_timeout() -> u64 {
    60
}

fn default_rate_limit_cooldown() -> u64 {
    60
}

fn default_max_cooldown() -> u64 {
    300
}

fn default_max_failures_threshold() -> u32 {
    3
}

pub fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_api_keys_accept_plain_and_detailed_entries() {
        let yaml = r#"
api_keys:
  - sk-plain-0000000001
  - key: sk-custom-000000002
    base_url: https://proxy.example.com/v1
  - key: sk-nourl-0000000003
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        let keys = config.key_configs();

        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0].key.expose_secret(), "sk-plain-0000000001");
        assert_eq!(keys[0].base_url, "https://api.openai.com/v1");
        assert_eq!(keys[1].base_url, "https://proxy.example.com/v1");
        assert_eq!(keys[2].base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.port, 7860);
        assert_eq!(config.retry.max_attempts, None);
        assert_eq!(config.retry.max_failures_threshold, 3);
        assert_eq!(config.retry.stream_idle_timeout_secs, 60);
        assert!(!config.status.expose_full_keys);
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_access_tokens_include_auth_token_once() {
        let config = AppConfig {
            allowed_tokens: vec!["sk-client-1".into(), "sk-client-2".into()],
            auth_token: Some("sk-client-1".into()),
            ..AppConfig::default()
        };
        assert_eq!(config.access_tokens(), vec!["sk-client-1", "sk-client-2"]);

        let config = AppConfig {
            auth_token: Some("sk-admin".into()),
            ..AppConfig::default()
        };
        assert_eq!(config.access_tokens(), vec!["sk-admin"]);
    }
}
