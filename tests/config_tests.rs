// tests/config_tests.rs

use openai_key_rotation_proxy::{
    config::{load_config, ApiKeyEntry},
    error::AppError,
};
use secrecy::ExposeSecret;
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

const ENV_VARS: &[&str] = &[
    "API_KEYS",
    "ALLOWED_TOKENS",
    "AUTH_TOKEN",
    "AVAILABLE_MODELS",
    "BASE_URL",
    "PORT",
    "MAX_ATTEMPTS",
    "MAX_FAILURES_THRESHOLD",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_load_from_yaml_file() {
    clear_env();
    let file = write_config(
        r#"
server:
  port: 8088
api_keys:
  - sk-yaml-key-00001
  - key: sk-yaml-key-00002
    base_url: https://azure.example.com/openai/v1
allowed_tokens:
  - sk-client-a
available_models:
  - gpt-4o-mini
retry:
  max_attempts: 4
  rate_limit_cooldown_secs: 30
"#,
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.server.port, 8088);
    assert_eq!(config.available_models, vec!["gpt-4o-mini"]);
    assert_eq!(config.retry.max_attempts, Some(4));
    assert_eq!(config.retry.rate_limit_cooldown_secs, 30);
    assert_eq!(config.auth_token.as_deref(), Some("sk-client-a"));

    let keys = config.key_configs();
    assert_eq!(keys[0].base_url, "https://api.openai.com/v1");
    assert_eq!(keys[1].key.expose_secret(), "sk-yaml-key-00002");
    assert_eq!(keys[1].base_url, "https://azure.example.com/openai/v1");
}

#[test]
#[serial]
fn test_environment_only_configuration() {
    clear_env();
    std::env::set_var("API_KEYS", r#"["sk-env-key-000001", "sk-env-key-000002"]"#);
    std::env::set_var("ALLOWED_TOKENS", r#"["sk-client-env"]"#);
    std::env::set_var("BASE_URL", "https://gateway.example.com/v1");
    std::env::set_var("PORT", "9001");

    let config = load_config(std::path::Path::new("/nonexistent/config.yaml")).unwrap();
    clear_env();

    assert_eq!(
        config.api_keys,
        vec![
            ApiKeyEntry::Plain("sk-env-key-000001".into()),
            ApiKeyEntry::Plain("sk-env-key-000002".into()),
        ]
    );
    assert_eq!(config.server.port, 9001);
    assert_eq!(config.key_configs()[0].base_url, "https://gateway.example.com/v1");
    assert_eq!(config.access_tokens(), vec!["sk-client-env"]);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_env();
    let file = write_config(
        r#"
api_keys: [sk-yaml-key-00001]
allowed_tokens: [sk-client-a]
"#,
    );
    std::env::set_var("API_KEYS", r#"[{"key": "sk-env-key-000003"}]"#);
    std::env::set_var("MAX_FAILURES_THRESHOLD", "5");

    let config = load_config(file.path()).unwrap();
    clear_env();

    assert_eq!(config.api_keys.len(), 1);
    assert_eq!(config.api_keys[0].key(), "sk-env-key-000003");
    assert_eq!(config.retry.max_failures_threshold, 5);
}

#[test]
#[serial]
fn test_malformed_api_keys_env_fails_validation() {
    clear_env();
    std::env::set_var("API_KEYS", "sk-not-a-json-list");
    std::env::set_var("ALLOWED_TOKENS", r#"["sk-client"]"#);

    let result = load_config(std::path::Path::new("/nonexistent/config.yaml"));
    clear_env();

    match result {
        Err(AppError::ConfigValidation { field, .. }) => assert_eq!(field.as_deref(), Some("api_keys")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_invalid_yaml_is_reported() {
    clear_env();
    let file = write_config("api_keys: [unclosed");
    assert!(matches!(load_config(file.path()), Err(AppError::YamlParsing(_))));
}
