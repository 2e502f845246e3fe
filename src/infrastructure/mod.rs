//! Shared infrastructure: configuration, errors, metrics, and the Redis
//! connection layer.

pub mod config;
pub mod error;
pub mod metrics;
pub mod redis;
