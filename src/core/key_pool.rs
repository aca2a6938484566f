// src/core/key_pool.rs

use crate::config::{AppConfig, KeyConfig};
use crate::core::key_state::{preview_key, KeyRecord, KeyStatus};
use crate::error::{AppError, Result};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

/// How identifiers appear in a [`PoolSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyVisibility {
    Redacted,
    Full,
}

/// Identifiers grouped by status, in rotation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub valid: Vec<String>,
    pub cooling: Vec<String>,
    pub invalid: Vec<String>,
}

/// The process-wide set of API keys and their health.
///
/// Rotation order is the configuration order and never changes. Every
/// mutation locks only the record it touches.
#[derive(Debug)]
pub struct KeyPool {
    records: Vec<Arc<KeyRecord>>,
    positions: HashMap<String, usize>,
}

impl KeyPool {
    #[instrument(skip(keys), fields(keys.count = keys.len()), name = "key_pool_init")]
    pub fn new(keys: &[KeyConfig]) -> Result<Self> {
        let mut records = Vec::with_capacity(keys.len());
        let mut positions = HashMap::with_capacity(keys.len());

        for key in keys {
            let secret = key.key.expose_secret();
            if positions.insert(secret.clone(), records.len()).is_some() {
                return Err(AppError::config_validation(
                    format!("Duplicate API key: {}", preview_key(secret)),
                    Some("api_keys"),
                ));
            }
            records.push(Arc::new(KeyRecord::new(key)));
        }

        info!(keys.count = records.len(), "Key pool initialized");
        Ok(Self { records, positions })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(&config.key_configs())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in rotation order, whatever their status.
    pub fn records(&self) -> &[Arc<KeyRecord>] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Result<&Arc<KeyRecord>> {
        self.positions
            .get(id)
            .map(|&pos| &self.records[pos])
            .ok_or_else(|| AppError::UnknownKey(preview_key(id)))
    }

    /// Currently Valid records, in rotation order.
    pub fn list_valid(&self) -> Vec<Arc<KeyRecord>> {
        self.records
            .iter()
            .filter(|record| record.is_available())
            .cloned()
            .collect()
    }

    pub fn mark_invalid(&self, id: &str, reason: &str) -> Result<()> {
        let record = self.get(id)?;
        record.update(|health| health.block(reason));
        warn!(api_key.preview = %record.preview(), reason, "API key marked invalid");
        Ok(())
    }

    pub fn mark_cooling(&self, id: &str, until: Instant, reason: &str) -> Result<()> {
        let record = self.get(id)?;
        let status = record.update(|health| {
            health.cool_down(until, reason);
            health.status
        });
        let cooldown = match status {
            KeyStatus::Cooling { until } => until.saturating_duration_since(Instant::now()),
            _ => Duration::ZERO,
        };
        warn!(
            api_key.preview = %record.preview(),
            cooldown = ?cooldown,
            status = status.label(),
            "API key cooling down"
        );
        Ok(())
    }

    /// Explicit revalidation; the only way out of Invalid.
    pub fn mark_valid(&self, id: &str) -> Result<()> {
        let record = self.get(id)?;
        record.update(|health| health.reset());
        info!(api_key.preview = %record.preview(), "API key revalidated");
        Ok(())
    }

    pub fn record_success(&self, id: &str) -> Result<()> {
        self.get(id)?.update(|health| health.record_success());
        Ok(())
    }

    /// Counts a transient failure; returns the resulting status.
    pub fn record_transient_failure(
        &self,
        id: &str,
        reason: &str,
        max_failures: u32,
    ) -> Result<KeyStatus> {
        let record = self.get(id)?;
        let (status, failures) = record.update(|health| {
            health.record_failure(reason, max_failures);
            (health.status, health.consecutive_failures)
        });
        warn!(
            api_key.preview = %record.preview(),
            failures,
            status = status.label(),
            "Transient failure recorded"
        );
        Ok(status)
    }

    pub fn snapshot(&self, visibility: KeyVisibility) -> PoolSnapshot {
        let mut snapshot = PoolSnapshot::default();
        for record in &self.records {
            let id = match visibility {
                KeyVisibility::Redacted => record.preview().to_string(),
                KeyVisibility::Full => record.id().to_string(),
            };
            match record.status() {
                KeyStatus::Valid => snapshot.valid.push(id),
                KeyStatus::Cooling { .. } => snapshot.cooling.push(id),
                KeyStatus::Invalid => snapshot.invalid.push(id),
            }
        }
        snapshot
    }
}
