// src/core/mod.rs

pub mod key_pool;
pub mod key_rotation;
pub mod key_state;
pub mod retry;
pub mod status;
pub mod stream;

pub use key_pool::{KeyPool, KeyVisibility, PoolSnapshot};
pub use key_rotation::{KeyRotationStrategy, KeySelector, RoundRobinStrategy};
pub use key_state::{KeyHealth, KeyRecord, KeyStatus};
pub use retry::{AttemptRecord, RetryOrchestrator, RetryPolicy};
pub use status::{KeyStatusReport, StatusReporter};
pub use stream::CommittedStream;
