// src/handlers/server_error.rs

use super::base::{upstream_message, ResponseHandler};
use crate::upstream::AttemptError;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use tracing::warn;

/// Handler for provider-side failures that should trigger key rotation
pub struct ServerErrorHandler;

impl ResponseHandler for ServerErrorHandler {
    fn handle(&self, status: StatusCode, _headers: &HeaderMap, body: &Bytes) -> Option<AttemptError> {
        if !status.is_server_error() {
            return None;
        }

        let message = upstream_message(body);
        warn!(
            status = status.as_u16(),
            response_body = %message,
            "Server error detected, will retry with next key"
        );
        Some(AttemptError::Transient(format!("upstream server error ({status}): {message}")))
    }
}
