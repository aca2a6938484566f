// src/handlers/invalid_api_key.rs

use super::base::{upstream_message, ResponseHandler};
use crate::upstream::AttemptError;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// Markers providers put in a 400 body when the key itself is bad.
const INVALID_KEY_MARKERS: &[&str] = &["invalid_api_key", "API_KEY_INVALID", "Incorrect API key"];

pub struct InvalidApiKeyHandler;

impl ResponseHandler for InvalidApiKeyHandler {
    fn handle(&self, status: StatusCode, _headers: &HeaderMap, body: &Bytes) -> Option<AttemptError> {
        let rejected = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => true,
            StatusCode::BAD_REQUEST => std::str::from_utf8(body)
                .map(|text| INVALID_KEY_MARKERS.iter().any(|marker| text.contains(marker)))
                .unwrap_or(false),
            _ => false,
        };

        rejected.then(|| AttemptError::AuthFailure {
            status,
            message: upstream_message(body),
        })
    }
}
