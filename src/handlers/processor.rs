// src/handlers/processor.rs

use crate::handlers::{
    base::ResponseHandler, invalid_api_key::InvalidApiKeyHandler, rate_limit::RateLimitHandler,
    server_error::ServerErrorHandler, terminal_error::TerminalErrorHandler, timeout::TimeoutHandler,
};
use crate::upstream::AttemptError;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// Classifies a non-success upstream response through a chain of handlers.
#[derive(Clone)]
pub struct ResponseProcessor {
    handlers: Arc<Vec<Box<dyn ResponseHandler>>>,
}

impl ResponseProcessor {
    /// Creates a new `ResponseProcessor` with a given chain of handlers.
    pub fn new(handlers: Vec<Box<dyn ResponseHandler>>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    /// The first handler that recognizes the response wins. Anything no
    /// handler claims is treated as a failure of the request itself.
    pub fn classify(&self, status: StatusCode, headers: &HeaderMap, body: &Bytes) -> AttemptError {
        let classified = self
            .handlers
            .iter()
            .find_map(|handler| handler.handle(status, headers, body));

        classified.unwrap_or_else(|| {
            debug!(status = status.as_u16(), "No handler matched upstream response");
            AttemptError::NonRetryable {
                status,
                body: String::from_utf8_lossy(body).into_owned(),
            }
        })
    }
}

impl Default for ResponseProcessor {
    fn default() -> Self {
        Self::new(vec![
            Box::new(InvalidApiKeyHandler),
            Box::new(RateLimitHandler),
            Box::new(TimeoutHandler),
            Box::new(ServerErrorHandler),
            Box::new(TerminalErrorHandler),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::FailureKind;
    use rstest::rstest;

    #[rstest]
    #[case(StatusCode::UNAUTHORIZED, "", FailureKind::AuthFailure)]
    #[case(StatusCode::FORBIDDEN, "", FailureKind::AuthFailure)]
    #[case(StatusCode::BAD_REQUEST, r#"{"error":{"code":"invalid_api_key"}}"#, FailureKind::AuthFailure)]
    #[case(StatusCode::BAD_REQUEST, r#"{"error":{"message":"bad messages"}}"#, FailureKind::NonRetryable)]
    #[case(StatusCode::TOO_MANY_REQUESTS, "", FailureKind::RateLimited)]
    #[case(StatusCode::REQUEST_TIMEOUT, "", FailureKind::TransientNetworkError)]
    #[case(StatusCode::GATEWAY_TIMEOUT, "", FailureKind::TransientNetworkError)]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, "", FailureKind::TransientNetworkError)]
    #[case(StatusCode::SERVICE_UNAVAILABLE, "", FailureKind::TransientNetworkError)]
    #[case(StatusCode::NOT_FOUND, "", FailureKind::NonRetryable)]
    #[case(StatusCode::UNPROCESSABLE_ENTITY, "", FailureKind::NonRetryable)]
    fn test_default_chain(
        #[case] status: StatusCode,
        #[case] body: &'static str,
        #[case] expected: FailureKind,
    ) {
        let processor = ResponseProcessor::default();
        let error = processor.classify(status, &HeaderMap::new(), &Bytes::from_static(body.as_bytes()));
        assert_eq!(error.kind(), expected);
    }

    #[test]
    fn test_unmatched_status_is_non_retryable() {
        let processor = ResponseProcessor::new(vec![]);
        let error = processor.classify(StatusCode::IM_A_TEAPOT, &HeaderMap::new(), &Bytes::from_static(b"tea"));
        assert_eq!(
            error,
            AttemptError::NonRetryable {
                status: StatusCode::IM_A_TEAPOT,
                body: "tea".into(),
            }
        );
    }
}
