// src/middleware/auth.rs

use crate::{error::AppError, state::AppState};
use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Constant-time string comparison to prevent timing attacks
fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }
    result == 0
}

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

/// Middleware for client authentication.
/// Accepts `Authorization: Bearer <token>` matching any allowed token.
pub async fn bearer_auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let authorized = bearer_token(&req).is_some_and(|token| {
        state
            .access_tokens()
            .iter()
            .fold(false, |matched, allowed| secure_compare(token, allowed) | matched)
    });

    if authorized {
        debug!("Client authentication successful");
        Ok(next.run(req).await)
    } else {
        warn!(url.path = %req.uri().path(), "Client authentication failed: invalid or missing token");
        Err(AppError::Unauthorized)
    }
}
