// src/core/status.rs

use crate::core::key_pool::{KeyPool, KeyVisibility};
use serde::Serialize;
use std::sync::Arc;

/// Keys grouped by status, as shown on the status endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct KeyStatusReport {
    pub valid_keys: Vec<String>,
    pub invalid_keys: Vec<String>,
    pub cooling_keys: Vec<String>,
    pub total: usize,
}

/// Read-only view over the key pool. Never mutates anything except the
/// lazy restore of expired cooldowns that every pool read performs.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    pool: Arc<KeyPool>,
    visibility: KeyVisibility,
}

impl StatusReporter {
    pub fn new(pool: Arc<KeyPool>, visibility: KeyVisibility) -> Self {
        Self { pool, visibility }
    }

    pub fn report(&self) -> KeyStatusReport {
        let snapshot = self.pool.snapshot(self.visibility);
        let total = snapshot.valid.len() + snapshot.invalid.len() + snapshot.cooling.len();
        KeyStatusReport {
            valid_keys: snapshot.valid,
            invalid_keys: snapshot.invalid,
            cooling_keys: snapshot.cooling,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyConfig;
    use std::time::Duration;
    use tokio::time::Instant;

    fn pool() -> Arc<KeyPool> {
        let keys = vec![
            KeyConfig::new("sk-status-key-0001", "https://api.openai.com/v1"),
            KeyConfig::new("sk-status-key-0002", "https://api.openai.com/v1"),
            KeyConfig::new("sk-status-key-0003", "https://api.openai.com/v1"),
        ];
        Arc::new(KeyPool::new(&keys).unwrap())
    }

    #[test]
    fn test_report_groups_by_status() {
        let pool = pool();
        pool.mark_invalid("sk-status-key-0002", "401").unwrap();
        pool.mark_cooling("sk-status-key-0003", Instant::now() + Duration::from_secs(60), "429")
            .unwrap();

        let report = StatusReporter::new(Arc::clone(&pool), KeyVisibility::Redacted).report();
        assert_eq!(report.valid_keys, vec!["sk-s...0001"]);
        assert_eq!(report.invalid_keys, vec!["sk-s...0002"]);
        assert_eq!(report.cooling_keys, vec!["sk-s...0003"]);
        assert_eq!(report.total, 3);
    }

    #[test]
    fn test_full_visibility_shows_keys() {
        let report = StatusReporter::new(pool(), KeyVisibility::Full).report();
        assert_eq!(report.valid_keys[0], "sk-status-key-0001");
        assert!(report.invalid_keys.is_empty());
    }

    #[test]
    fn test_report_is_repeatable() {
        let reporter = StatusReporter::new(pool(), KeyVisibility::Redacted);
        assert_eq!(reporter.report(), reporter.report());
    }
}
