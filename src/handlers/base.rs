// src/handlers/base.rs

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::upstream::AttemptError;

const MAX_MESSAGE_LEN: usize = 300;

/// A trait for classifying non-success responses from the upstream service.
/// Each implementation is responsible for a specific case (e.g., rate limit).
pub trait ResponseHandler: Send + Sync {
    /// Examines the response and decides how the attempt failed.
    ///
    /// # Returns
    /// * `Some(AttemptError)` if this handler recognizes the response.
    /// * `None` to let the next handler in the chain try.
    fn handle(&self, status: StatusCode, headers: &HeaderMap, body: &Bytes) -> Option<AttemptError>;
}

/// Pulls a human-readable message out of an upstream error body.
///
/// Understands the `{"error": {"message": ...}}` shape; otherwise falls
/// back to the raw text, truncated.
pub fn upstream_message(body: &Bytes) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        let message = json
            .pointer("/error/message")
            .or_else(|| json.get("message"))
            .and_then(|m| m.as_str());
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.chars().count() > MAX_MESSAGE_LEN {
        let truncated: String = text.chars().take(MAX_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}
