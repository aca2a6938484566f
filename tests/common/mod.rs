//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use openai_key_rotation_proxy::{
    config::{ApiKeyEntry, AppConfig, KeyConfig},
    core::{KeyPool, KeyRecord, RetryOrchestrator, RetryPolicy},
    upstream::{AttemptError, StreamError, UpstreamInvoker, UpstreamReply, UpstreamRequest},
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

pub const CLIENT_TOKEN: &str = "sk-client-token";
pub const BASE_URL: &str = "https://api.example.com/v1";

/// `n` distinct keys, long enough to be previewed.
pub fn test_keys(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("sk-test-key-{i:04}")).collect()
}

/// Test configuration builder
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig {
                allowed_tokens: vec![CLIENT_TOKEN.to_string()],
                default_base_url: BASE_URL.to_string(),
                ..AppConfig::default()
            },
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_keys.push(ApiKeyEntry::Plain(key.into()));
        self
    }

    pub fn with_api_keys(self, keys: &[String]) -> Self {
        keys.iter().fold(self, |builder, key| builder.with_api_key(key.clone()))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.default_base_url = url.into();
        self
    }

    pub fn with_available_models(mut self, models: &[&str]) -> Self {
        self.config.available_models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = Some(attempts);
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// What a scripted key does on its next call.
pub enum Outcome {
    Payload(Value),
    /// Chunks, then the end of the stream. `Err` items are stream errors.
    Stream(Vec<Result<&'static str, &'static str>>),
    /// One chunk, then nothing ever again.
    StreamThenStall(&'static str),
    Fail(AttemptError),
    /// Never answers.
    Hang,
}

impl Outcome {
    pub fn auth_failure() -> Self {
        Self::Fail(AttemptError::AuthFailure {
            status: http::StatusCode::UNAUTHORIZED,
            message: "Incorrect API key provided".to_string(),
        })
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self::Fail(AttemptError::RateLimited {
            retry_after: retry_after_secs.map(std::time::Duration::from_secs),
            message: "Rate limit reached".to_string(),
        })
    }

    pub fn transient() -> Self {
        Self::Fail(AttemptError::Transient("connection reset by peer".to_string()))
    }

    pub fn non_retryable(status: http::StatusCode, body: &str) -> Self {
        Self::Fail(AttemptError::NonRetryable {
            status,
            body: body.to_string(),
        })
    }
}

/// Invoker that plays back per-key scripts and records every call.
///
/// A key with nothing left in its script answers `{"served_by": <key>}`.
#[derive(Default)]
pub struct ScriptedInvoker {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    calls: Mutex<Vec<String>>,
    dropped_streams: Arc<AtomicUsize>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, key: &str, outcomes: Vec<Outcome>) -> Self {
        self.scripts
            .lock()
            .entry(key.to_string())
            .or_default()
            .extend(outcomes);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.calls.lock().iter().filter(|k| k.as_str() == key).count()
    }

    /// Scripted upstream streams that have been dropped so far.
    pub fn dropped_streams(&self) -> usize {
        self.dropped_streams.load(Ordering::SeqCst)
    }

    fn tracked(&self, inner: ChunkStream) -> ChunkStream {
        Box::pin(TrackedStream {
            inner,
            dropped: Arc::clone(&self.dropped_streams),
        })
    }
}

type ChunkStream = stream::BoxStream<'static, Result<Bytes, StreamError>>;

/// Counts its own drop, standing in for the upstream connection.
struct TrackedStream {
    inner: ChunkStream,
    dropped: Arc<AtomicUsize>,
}

impl futures_util::Stream for TrackedStream {
    type Item = Result<Bytes, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

fn chunk_stream(items: Vec<Result<&'static str, &'static str>>) -> ChunkStream {
    stream::iter(items.into_iter().map(|item| {
        item.map(|s| Bytes::from_static(s.as_bytes()))
            .map_err(|e| StreamError(e.to_string()))
    }))
    .boxed()
}

#[async_trait]
impl UpstreamInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        _request: &UpstreamRequest,
        key: &KeyRecord,
    ) -> Result<UpstreamReply, AttemptError> {
        self.calls.lock().push(key.id().to_string());
        let next = self
            .scripts
            .lock()
            .get_mut(key.id())
            .and_then(VecDeque::pop_front);

        match next {
            None => Ok(UpstreamReply::Payload(json!({ "served_by": key.id() }))),
            Some(Outcome::Payload(value)) => Ok(UpstreamReply::Payload(value)),
            Some(Outcome::Stream(items)) => Ok(UpstreamReply::Stream(self.tracked(chunk_stream(items)))),
            Some(Outcome::StreamThenStall(chunk)) => Ok(UpstreamReply::Stream(
                self.tracked(chunk_stream(vec![Ok(chunk)]).chain(stream::pending()).boxed()),
            )),
            Some(Outcome::Fail(error)) => Err(error),
            Some(Outcome::Hang) => std::future::pending().await,
        }
    }
}

pub fn key_configs(keys: &[String]) -> Vec<KeyConfig> {
    keys.iter().map(|k| KeyConfig::new(k.as_str(), BASE_URL)).collect()
}

/// A pool over `keys` and an orchestrator driving `invoker`.
pub fn orchestrator(
    keys: &[String],
    invoker: Arc<ScriptedInvoker>,
    policy: RetryPolicy,
) -> (Arc<KeyPool>, RetryOrchestrator) {
    let pool = Arc::new(KeyPool::new(&key_configs(keys)).expect("pool"));
    let orchestrator = RetryOrchestrator::new(Arc::clone(&pool), invoker, policy);
    (pool, orchestrator)
}
