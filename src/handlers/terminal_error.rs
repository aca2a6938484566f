// src/handlers/terminal_error.rs

use super::base::ResponseHandler;
use crate::upstream::AttemptError;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// Last in the chain: client errors no earlier handler claimed belong to
/// the request itself, so another key would fail the same way.
pub struct TerminalErrorHandler;

impl ResponseHandler for TerminalErrorHandler {
    fn handle(&self, status: StatusCode, _headers: &HeaderMap, body: &Bytes) -> Option<AttemptError> {
        status.is_client_error().then(|| AttemptError::NonRetryable {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_passes_body_through() {
        let body = Bytes::from_static(br#"{"error": {"message": "model not found"}}"#);
        let error = TerminalErrorHandler.handle(StatusCode::NOT_FOUND, &HeaderMap::new(), &body);
        assert_eq!(
            error,
            Some(AttemptError::NonRetryable {
                status: StatusCode::NOT_FOUND,
                body: r#"{"error": {"message": "model not found"}}"#.into(),
            })
        );
    }

    #[test]
    fn test_server_errors_not_handled() {
        let error = TerminalErrorHandler.handle(StatusCode::BAD_GATEWAY, &HeaderMap::new(), &Bytes::new());
        assert!(error.is_none());
    }
}
