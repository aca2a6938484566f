// src/handlers/timeout.rs

use crate::handlers::base::{upstream_message, ResponseHandler};
use crate::upstream::AttemptError;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use tracing::warn;

/// Handler for timeout-specific errors
pub struct TimeoutHandler;

impl ResponseHandler for TimeoutHandler {
    fn handle(&self, status: StatusCode, _headers: &HeaderMap, body: &Bytes) -> Option<AttemptError> {
        // Handle gateway timeout (504) and request timeout (408)
        if matches!(status, StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT) {
            warn!(
                status = status.as_u16(),
                "Timeout error detected, will retry with next key"
            );
            return Some(AttemptError::Transient(format!(
                "upstream timeout ({status}): {}",
                upstream_message(body)
            )));
        }

        None
    }
}
