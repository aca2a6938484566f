// src/middleware/mod.rs

pub mod auth;

pub use auth::bearer_auth_middleware;
