// src/handlers/rate_limit.rs

use super::base::{upstream_message, ResponseHandler};
use crate::upstream::AttemptError;
use bytes::Bytes;
use http::{header::RETRY_AFTER, HeaderMap, StatusCode};
use std::time::Duration;

pub struct RateLimitHandler;

impl ResponseHandler for RateLimitHandler {
    fn handle(&self, status: StatusCode, headers: &HeaderMap, body: &Bytes) -> Option<AttemptError> {
        if status != StatusCode::TOO_MANY_REQUESTS {
            return None;
        }

        Some(AttemptError::RateLimited {
            retry_after: retry_after(headers),
            message: upstream_message(body),
        })
    }
}

/// `Retry-After` in delta-seconds. HTTP dates are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
