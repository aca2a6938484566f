// src/state.rs

use crate::config::AppConfig;
use crate::core::{KeyPool, KeyVisibility, RetryOrchestrator, RetryPolicy, StatusReporter};
use crate::error::Result;
use crate::proxy::ReqwestInvoker;
use crate::upstream::UpstreamInvoker;
use std::sync::Arc;
use tracing::info;

/// Represents the shared application state that is accessible by all Axum handlers.
pub struct AppState {
    pub config: AppConfig,
    pub pool: Arc<KeyPool>,
    pub orchestrator: RetryOrchestrator,
    pub reporter: StatusReporter,
    access_tokens: Vec<String>,
}

impl AppState {
    /// Builds the key pool and the shared HTTP client.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let pool = Arc::new(KeyPool::from_config(config)?);
        let invoker = ReqwestInvoker::new(&config.server, pool.len())?;
        info!(keys = pool.len(), "HTTP client created successfully.");
        Ok(Self::assemble(config, pool, Arc::new(invoker)))
    }

    /// Same as [`AppState::new`] but with a caller-supplied invoker.
    pub fn with_invoker(config: &AppConfig, invoker: Arc<dyn UpstreamInvoker>) -> Result<Self> {
        let pool = Arc::new(KeyPool::from_config(config)?);
        Ok(Self::assemble(config, pool, invoker))
    }

    fn assemble(config: &AppConfig, pool: Arc<KeyPool>, invoker: Arc<dyn UpstreamInvoker>) -> Self {
        let visibility = if config.status.expose_full_keys {
            KeyVisibility::Full
        } else {
            KeyVisibility::Redacted
        };

        Self {
            config: config.clone(),
            orchestrator: RetryOrchestrator::new(
                Arc::clone(&pool),
                invoker,
                RetryPolicy::from(&config.retry),
            ),
            reporter: StatusReporter::new(Arc::clone(&pool), visibility),
            pool,
            access_tokens: config.access_tokens(),
        }
    }

    pub fn access_tokens(&self) -> &[String] {
        &self.access_tokens
    }
}
