// src/handlers/mod.rs

pub mod base;
pub mod invalid_api_key;
pub mod processor;
pub mod rate_limit;
pub mod server_error;
pub mod terminal_error;
pub mod timeout;

pub use base::ResponseHandler;
pub use processor::ResponseProcessor;
