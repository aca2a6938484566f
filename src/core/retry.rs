// src/core/retry.rs

use crate::config::RetryConfig;
use crate::core::key_pool::KeyPool;
use crate::core::key_rotation::KeySelector;
use crate::core::key_state::{KeyRecord, KeyStatus};
use crate::core::stream::CommittedStream;
use crate::error::{AppError, Result};
use crate::upstream::{
    AttemptError, FailureKind, UpstreamInvoker, UpstreamReply, UpstreamRequest, UpstreamResponse,
};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

/// Bounds of the attempt loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// `None` means one attempt per key in the pool.
    pub max_attempts: Option<u32>,
    pub attempt_timeout: Duration,
    /// Longest silence tolerated from a committed stream.
    pub stream_idle_timeout: Duration,
    pub rate_limit_cooldown: Duration,
    pub max_cooldown: Duration,
    pub max_failures_threshold: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
            stream_idle_timeout: Duration::from_secs(config.stream_idle_timeout_secs),
            rate_limit_cooldown: Duration::from_secs(config.rate_limit_cooldown_secs),
            max_cooldown: Duration::from_secs(config.max_cooldown_secs),
            max_failures_threshold: config.max_failures_threshold,
        }
    }
}

/// What to do with the key after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Stop and hand the error to the caller.
    Surface,
    /// Block the key, try another.
    Invalidate,
    /// Rest the key for the given time, try another.
    CoolDown(Duration),
    /// Count a failure against the key, try another.
    CountFailure,
}

/// Maps a classified failure to the retry decision.
pub fn decide(error: &AttemptError, policy: &RetryPolicy) -> Decision {
    match error {
        AttemptError::NonRetryable { .. } => Decision::Surface,
        AttemptError::AuthFailure { .. } => Decision::Invalidate,
        AttemptError::RateLimited { retry_after, .. } => Decision::CoolDown(
            retry_after
                .map(|wait| wait.min(policy.max_cooldown))
                .unwrap_or(policy.rate_limit_cooldown),
        ),
        AttemptError::Transient(_) => Decision::CountFailure,
    }
}

/// One failed attempt, kept for the exhaustion report.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub key_preview: String,
    pub kind: FailureKind,
    pub summary: String,
    pub at: DateTime<Utc>,
}

impl AttemptRecord {
    fn new(attempt: u32, key: &KeyRecord, error: &AttemptError) -> Self {
        Self {
            attempt,
            key_preview: key.preview().to_string(),
            kind: error.kind(),
            summary: error.to_string(),
            at: Utc::now(),
        }
    }
}

/// Drives the attempt loop for one inbound request at a time; shared by all.
pub struct RetryOrchestrator {
    pool: Arc<KeyPool>,
    selector: KeySelector,
    invoker: Arc<dyn UpstreamInvoker>,
    policy: RetryPolicy,
}

impl RetryOrchestrator {
    pub fn new(pool: Arc<KeyPool>, invoker: Arc<dyn UpstreamInvoker>, policy: RetryPolicy) -> Self {
        Self {
            pool,
            selector: KeySelector::with_round_robin(),
            invoker,
            policy,
        }
    }

    pub fn pool(&self) -> &Arc<KeyPool> {
        &self.pool
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy
            .max_attempts
            .unwrap_or(self.pool.len() as u32)
            .max(1)
    }

    #[instrument(skip_all, fields(endpoint = %request.endpoint, model = ?request.model, stream = request.stream))]
    pub async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let max_attempts = self.max_attempts();
        let mut tried: HashSet<String> = HashSet::new();
        let mut transient: HashSet<String> = HashSet::new();
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        while (attempts.len() as u32) < max_attempts {
            let key = match self.selector.next(&self.pool, &tried) {
                Ok(key) => key,
                Err(_) if !transient.is_empty() => {
                    // Everything was tried; keys that only hiccuped get another turn.
                    tried.retain(|id| !transient.contains(id));
                    transient.clear();
                    match self.selector.next(&self.pool, &tried) {
                        Ok(key) => key,
                        Err(_) => break,
                    }
                }
                Err(_) => break,
            };

            let attempt = attempts.len() as u32 + 1;
            info!(api_key.preview = %key.preview(), attempt, max_attempts, "Attempting to use key");

            let error = match self.attempt(&request, &key).await {
                Ok(response) => {
                    self.pool.record_success(key.id())?;
                    info!(api_key.preview = %key.preview(), attempt, "Upstream request succeeded");
                    return Ok(response);
                }
                Err(error) => error,
            };

            warn!(
                api_key.preview = %key.preview(),
                attempt,
                kind = %error.kind(),
                error = %error,
                "Upstream attempt failed"
            );

            match decide(&error, &self.policy) {
                Decision::Surface => {
                    if let AttemptError::NonRetryable { status, body } = error {
                        return Err(AppError::NonRetryable { status, body });
                    }
                    return Err(AppError::Internal(error.to_string()));
                }
                Decision::Invalidate => {
                    self.pool.mark_invalid(key.id(), &error.to_string())?;
                }
                Decision::CoolDown(wait) => {
                    self.pool
                        .mark_cooling(key.id(), Instant::now() + wait, &error.to_string())?;
                }
                Decision::CountFailure => {
                    let status = self.pool.record_transient_failure(
                        key.id(),
                        &error.to_string(),
                        self.policy.max_failures_threshold,
                    )?;
                    if status == KeyStatus::Valid {
                        transient.insert(key.id().to_string());
                    }
                }
            }

            attempts.push(AttemptRecord::new(attempt, &key, &error));
            tried.insert(key.id().to_string());
        }

        if attempts.is_empty() {
            warn!("No available API keys for the request");
            return Err(AppError::NoAvailableKeys);
        }

        warn!(attempts = attempts.len(), "All upstream attempts failed");
        Err(AppError::UpstreamExhausted { attempts })
    }

    /// One deadline-bounded attempt. For streams the deadline also covers
    /// the first chunk, which is what commits the stream to this key.
    async fn attempt(
        &self,
        request: &UpstreamRequest,
        key: &KeyRecord,
    ) -> std::result::Result<UpstreamResponse, AttemptError> {
        let deadline = self.policy.attempt_timeout;
        tokio::time::timeout(deadline, self.invoke_and_commit(request, key))
            .await
            .map_err(|_| {
                AttemptError::Transient(format!("attempt timed out after {deadline:?}"))
            })?
    }

    async fn invoke_and_commit(
        &self,
        request: &UpstreamRequest,
        key: &KeyRecord,
    ) -> std::result::Result<UpstreamResponse, AttemptError> {
        match self.invoker.invoke(request, key).await? {
            UpstreamReply::Payload(value) => Ok(UpstreamResponse::Payload(value)),
            UpstreamReply::Stream(mut chunks) => {
                let first = match chunks.next().await {
                    Some(Ok(chunk)) => Some(chunk),
                    Some(Err(error)) => {
                        return Err(AttemptError::Transient(format!(
                            "stream failed before first chunk: {}",
                            error.0
                        )))
                    }
                    None => None,
                };
                Ok(UpstreamResponse::Stream(CommittedStream::new(
                    first,
                    chunks,
                    key.preview(),
                    self.policy.stream_idle_timeout,
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_decide_non_retryable_surfaces() {
        let error = AttemptError::NonRetryable {
            status: StatusCode::BAD_REQUEST,
            body: "{}".into(),
        };
        assert_eq!(decide(&error, &RetryPolicy::default()), Decision::Surface);
    }

    #[test]
    fn test_decide_auth_failure_invalidates() {
        let error = AttemptError::AuthFailure {
            status: StatusCode::UNAUTHORIZED,
            message: "bad key".into(),
        };
        assert_eq!(decide(&error, &RetryPolicy::default()), Decision::Invalidate);
    }

    #[test]
    fn test_decide_rate_limit_uses_default_cooldown() {
        let policy = RetryPolicy::default();
        let error = AttemptError::RateLimited {
            retry_after: None,
            message: "slow down".into(),
        };
        assert_eq!(decide(&error, &policy), Decision::CoolDown(policy.rate_limit_cooldown));
    }

    #[test]
    fn test_decide_rate_limit_caps_retry_after() {
        let policy = RetryPolicy {
            max_cooldown: Duration::from_secs(120),
            ..RetryPolicy::default()
        };
        let long = AttemptError::RateLimited {
            retry_after: Some(Duration::from_secs(3600)),
            message: String::new(),
        };
        let short = AttemptError::RateLimited {
            retry_after: Some(Duration::from_secs(5)),
            message: String::new(),
        };
        assert_eq!(decide(&long, &policy), Decision::CoolDown(Duration::from_secs(120)));
        assert_eq!(decide(&short, &policy), Decision::CoolDown(Duration::from_secs(5)));
    }

    #[test]
    fn test_decide_transient_counts_failure() {
        let error = AttemptError::Transient("connection reset".into());
        assert_eq!(decide(&error, &RetryPolicy::default()), Decision::CountFailure);
    }

    #[test]
    fn test_policy_from_config() {
        let config = RetryConfig {
            max_attempts: Some(5),
            attempt_timeout_secs: 30,
            stream_idle_timeout_secs: 15,
            ..RetryConfig::default()
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, Some(5));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(30));
        assert_eq!(policy.stream_idle_timeout, Duration::from_secs(15));
    }
}
