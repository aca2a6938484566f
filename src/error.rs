// src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::core::retry::AttemptRecord;

/// Представляет структурированное тело ответа об ошибке.
#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: ErrorDetails,
}

/// Содержит детали ошибки для тела ответа.
#[derive(Serialize, Debug)]
struct ErrorDetails {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

/// Представляет возможные ошибки, которые могут возникнуть в приложении.
///
/// Реализует `IntoResponse` для автоматического преобразования ошибок в
/// соответствующие HTTP-ответы с стандартизированным телом JSON.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration validation failed: {message}")]
    ConfigValidation {
        message: String,
        field: Option<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlParsing(#[from] serde_yaml::Error),

    #[error("HTTP client build error: {0}")]
    HttpClientBuild(#[source] reqwest::Error),

    /// No Valid credential existed when the request asked for one.
    #[error("No available API keys")]
    NoAvailableKeys,

    /// Every eligible credential was tried for this request and failed.
    #[error("All upstream attempts failed ({} attempts)", attempts.len())]
    UpstreamExhausted { attempts: Vec<AttemptRecord> },

    /// The upstream rejected the request itself; no other key would help.
    #[error("Upstream rejected the request: {status}")]
    NonRetryable { status: StatusCode, body: String },

    #[error("Unknown API key: {0}")]
    UnknownKey(String),

    #[error("Request body processing error: {0}")]
    RequestBodyError(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn config_validation(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// Преобразует AppError в кортеж из StatusCode и ErrorDetails.
    fn to_status_and_details(&self) -> (StatusCode, ErrorDetails) {
        match self {
            // --- 5xx Серверные ошибки ---
            Self::Config(_)
            | Self::ConfigValidation { .. }
            | Self::Io(_)
            | Self::YamlParsing(_)
            | Self::HttpClientBuild(_)
            | Self::Internal(_) => {
                error!(error = %self, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetails {
                        error_type: "INTERNAL_SERVER_ERROR".to_string(),
                        message: "An unexpected internal server error occurred".to_string(),
                        details: None,
                    },
                )
            }
            Self::NoAvailableKeys => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetails {
                    error_type: "NO_AVAILABLE_KEYS".to_string(),
                    message: "No available API keys to process the request at this time"
                        .to_string(),
                    details: None,
                },
            ),
            Self::UpstreamExhausted { attempts } => {
                error!(attempts = attempts.len(), "All upstream attempts failed");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorDetails {
                        error_type: "UPSTREAM_EXHAUSTED".to_string(),
                        message: format!(
                            "All {} upstream attempts failed",
                            attempts.len()
                        ),
                        details: serde_json::to_value(attempts).ok(),
                    },
                )
            }
            Self::NonRetryable { status, body } => (
                *status,
                ErrorDetails {
                    error_type: "UPSTREAM_REQUEST_REJECTED".to_string(),
                    message: "Upstream service rejected the request".to_string(),
                    details: Some(serde_json::Value::String(body.clone())),
                },
            ),

            // --- 4xx Клиентские ошибки ---
            Self::UnknownKey(preview) => (
                StatusCode::NOT_FOUND,
                ErrorDetails {
                    error_type: "UNKNOWN_KEY".to_string(),
                    message: format!("API key '{preview}' is not part of the pool"),
                    details: None,
                },
            ),
            Self::RequestBodyError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetails {
                    error_type: "REQUEST_BODY_ERROR".to_string(),
                    message: "Failed to process request body".to_string(),
                    details: Some(serde_json::Value::String(msg.clone())),
                },
            ),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorDetails {
                    error_type: "UNAUTHORIZED".to_string(),
                    message: "Invalid or missing bearer token".to_string(),
                    details: None,
                },
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Ответ провайдера в формате JSON отдаём клиенту как есть,
        // чтобы OpenAI-совместимые клиенты видели привычную ошибку.
        if let Self::NonRetryable { status, body } = &self {
            if let Ok(upstream_json) = serde_json::from_str::<serde_json::Value>(body) {
                return (*status, Json(upstream_json)).into_response();
            }
        }

        let (status, details) = self.to_status_and_details();
        (status, Json(ErrorResponse { error: details })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
