// src/upstream.rs

//! The seam between the retry loop and the network.
//!
//! An [`UpstreamInvoker`] performs exactly one credential-bound call and
//! reports the outcome as an [`UpstreamReply`] or a classified
//! [`AttemptError`]. It never retries on its own.

use crate::core::key_state::KeyRecord;
use crate::core::stream::CommittedStream;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use http::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Upstream operation a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ChatCompletions,
    Embeddings,
    Models,
}

impl Endpoint {
    /// Path relative to the key's base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Self::ChatCompletions => "chat/completions",
            Self::Embeddings => "embeddings",
            Self::Models => "models",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Self::Models => Method::GET,
            Self::ChatCompletions | Self::Embeddings => Method::POST,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// A request that has already passed authentication and schema checks.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub endpoint: Endpoint,
    pub body: Option<Value>,
    pub stream: bool,
    pub model: Option<String>,
}

impl UpstreamRequest {
    pub fn chat_completion(body: Value) -> Self {
        let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
        Self::with_body(Endpoint::ChatCompletions, body, stream)
    }

    pub fn embedding(body: Value) -> Self {
        Self::with_body(Endpoint::Embeddings, body, false)
    }

    pub fn list_models() -> Self {
        Self {
            endpoint: Endpoint::Models,
            body: None,
            stream: false,
            model: None,
        }
    }

    fn with_body(endpoint: Endpoint, body: Value, stream: bool) -> Self {
        let model = body.get("model").and_then(Value::as_str).map(str::to_string);
        Self {
            endpoint,
            body: Some(body),
            stream,
            model,
        }
    }
}

/// Error raised by an upstream body stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("upstream stream failed: {0}")]
pub struct StreamError(pub String);

/// Raw chunk sequence produced by an invoker.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// What an invoker hands back once the upstream accepted the call.
pub enum UpstreamReply {
    Payload(Value),
    Stream(ChunkStream),
}

impl fmt::Debug for UpstreamReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payload(value) => f.debug_tuple("Payload").field(value).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Final result of a successful `execute`.
#[derive(Debug)]
pub enum UpstreamResponse {
    Payload(Value),
    /// Committed to one key; later failures surface as stream errors.
    Stream(CommittedStream),
}

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AuthFailure,
    RateLimited,
    TransientNetworkError,
    NonRetryable,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AuthFailure => "auth_failure",
            Self::RateLimited => "rate_limited",
            Self::TransientNetworkError => "transient_network_error",
            Self::NonRetryable => "non_retryable",
        };
        f.write_str(label)
    }
}

/// Outcome of one failed attempt, as reported by the invoker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    #[error("credential rejected by upstream ({status}): {message}")]
    AuthFailure { status: StatusCode, message: String },

    #[error("rate limited by upstream: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("transient upstream error: {0}")]
    Transient(String),

    #[error("upstream rejected the request ({status})")]
    NonRetryable { status: StatusCode, body: String },
}

impl AttemptError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AuthFailure { .. } => FailureKind::AuthFailure,
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Transient(_) => FailureKind::TransientNetworkError,
            Self::NonRetryable { .. } => FailureKind::NonRetryable,
        }
    }
}

/// Performs the actual network call to the provider with one credential.
///
/// Streaming implementations must return only after the upstream has
/// accepted the call (2xx headers received) and must not pull any chunk
/// themselves; the orchestrator decides when a stream is committed.
#[async_trait]
pub trait UpstreamInvoker: Send + Sync {
    async fn invoke(
        &self,
        request: &UpstreamRequest,
        key: &KeyRecord,
    ) -> Result<UpstreamReply, AttemptError>;
}
