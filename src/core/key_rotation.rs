// src/core/key_rotation.rs

use crate::core::key_pool::KeyPool;
use crate::core::key_state::KeyRecord;
use crate::error::{AppError, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Strategy for selecting the next key
pub trait KeyRotationStrategy: Send + Sync {
    /// Picks an eligible record not in `excluding`, advancing `cursor`.
    fn select_key(
        &self,
        pool: &KeyPool,
        cursor: &AtomicUsize,
        excluding: &HashSet<String>,
    ) -> Option<Arc<KeyRecord>>;
}

/// Round-robin key selection strategy
pub struct RoundRobinStrategy;

impl KeyRotationStrategy for RoundRobinStrategy {
    fn select_key(
        &self,
        pool: &KeyPool,
        cursor: &AtomicUsize,
        excluding: &HashSet<String>,
    ) -> Option<Arc<KeyRecord>> {
        let records = pool.records();
        let len = records.len();
        if len == 0 {
            return None;
        }

        loop {
            let start = cursor.load(Ordering::Acquire);
            let chosen = (0..len).map(|offset| (start + offset) % len).find(|&pos| {
                let record = &records[pos];
                !excluding.contains(record.id()) && record.is_available()
            })?;

            // Another request moved the cursor while we scanned; rescan from there.
            if cursor
                .compare_exchange(start, (chosen + 1) % len, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let record = &records[chosen];
                debug!(
                    api_key.preview = %record.preview(),
                    index = chosen,
                    rotation_method = "round_robin",
                    "Selected available API key"
                );
                return Some(Arc::clone(record));
            }
            trace!("Rotation cursor contended, retrying selection");
        }
    }
}

/// High-level key selector holding the shared rotation cursor.
pub struct KeySelector {
    strategy: Box<dyn KeyRotationStrategy>,
    cursor: AtomicUsize,
}

impl KeySelector {
    pub fn new(strategy: Box<dyn KeyRotationStrategy>) -> Self {
        Self {
            strategy,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn with_round_robin() -> Self {
        Self::new(Box::new(RoundRobinStrategy))
    }

    /// Next eligible key, or `NoAvailableKeys` when every key is either
    /// unusable or already tried by this request.
    pub fn next(&self, pool: &KeyPool, excluding: &HashSet<String>) -> Result<Arc<KeyRecord>> {
        trace!(excluded = excluding.len(), "Selecting key from pool of {}", pool.len());
        self.strategy
            .select_key(pool, &self.cursor, excluding)
            .ok_or(AppError::NoAvailableKeys)
    }
}

impl Default for KeySelector {
    fn default() -> Self {
        Self::with_round_robin()
    }
}
