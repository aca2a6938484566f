// src/core/key_state.rs

use crate::config::KeyConfig;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use secrecy::{ExposeSecret, Secret};
use tokio::time::Instant;
use tracing::debug;

/// Health status of a single API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Valid,
    /// Rejected by the provider; only an explicit revalidation brings it back.
    Invalid,
    /// Temporarily unusable until `until`.
    Cooling { until: Instant },
}

impl KeyStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Cooling { .. } => "cooling",
        }
    }
}

/// Mutable health data of a key
#[derive(Clone, Debug, PartialEq)]
pub struct KeyHealth {
    pub status: KeyStatus,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Default for KeyHealth {
    fn default() -> Self {
        Self {
            status: KeyStatus::Valid,
            consecutive_failures: 0,
            last_error: None,
            last_failure: None,
            last_used_at: None,
        }
    }
}

impl KeyHealth {
    /// Restores an expired cooldown. Returns true if the status changed.
    pub fn refresh(&mut self, now: Instant) -> bool {
        match self.status {
            KeyStatus::Cooling { until } if until <= now => {
                self.status = KeyStatus::Valid;
                true
            }
            _ => false,
        }
    }

    /// Check if the key is available for use
    pub fn is_available(&self) -> bool {
        self.status == KeyStatus::Valid
    }

    pub fn block(&mut self, reason: &str) {
        self.status = KeyStatus::Invalid;
        self.note_failure(reason);
    }

    /// Invalid keys stay Invalid. A running cooldown is only ever extended.
    pub fn cool_down(&mut self, until: Instant, reason: &str) {
        match self.status {
            KeyStatus::Invalid => {}
            KeyStatus::Cooling { until: current } if current >= until => {}
            _ => self.status = KeyStatus::Cooling { until },
        }
        self.note_failure(reason);
    }

    /// Record a transient failure and block once `max_failures` is exceeded.
    pub fn record_failure(&mut self, reason: &str, max_failures: u32) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.note_failure(reason);

        if self.consecutive_failures > max_failures {
            self.status = KeyStatus::Invalid;
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_used_at = Some(Utc::now());
    }

    /// Reset the key state to available
    pub fn reset(&mut self) {
        self.status = KeyStatus::Valid;
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_failure = None;
    }

    fn note_failure(&mut self, reason: &str) {
        let now = Utc::now();
        self.last_error = Some(reason.to_string());
        self.last_failure = Some(now);
        self.last_used_at = Some(now);
    }
}

/// One credential of the pool with its own lock.
#[derive(Debug)]
pub struct KeyRecord {
    key: Secret<String>,
    base_url: String,
    preview: String,
    health: RwLock<KeyHealth>,
}

impl KeyRecord {
    pub fn new(config: &KeyConfig) -> Self {
        Self {
            preview: preview_key(config.key.expose_secret()),
            key: config.key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            health: RwLock::new(KeyHealth::default()),
        }
    }

    /// The pool identifier. Never log this; use [`KeyRecord::preview`].
    pub fn id(&self) -> &str {
        self.key.expose_secret()
    }

    pub fn secret(&self) -> &Secret<String> {
        &self.key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn preview(&self) -> &str {
        &self.preview
    }

    /// Current status; an expired cooldown is restored on the way.
    pub fn status(&self) -> KeyStatus {
        let now = Instant::now();
        let status = self.health.read().status;
        match status {
            KeyStatus::Cooling { until } if until <= now => {
                let mut health = self.health.write();
                if health.refresh(now) {
                    debug!(api_key.preview = %self.preview, "Cooldown expired, key is valid again");
                }
                health.status
            }
            other => other,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status() == KeyStatus::Valid
    }

    /// Snapshot of the health data.
    pub fn health(&self) -> KeyHealth {
        self.status();
        self.health.read().clone()
    }

    /// Applies `update` under this record's write lock only.
    pub(crate) fn update<R>(&self, update: impl FnOnce(&mut KeyHealth) -> R) -> R {
        let mut health = self.health.write();
        health.refresh(Instant::now());
        update(&mut health)
    }
}

/// Redacted form of a key for logs and reports.
pub fn preview_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}
