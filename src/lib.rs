// Infrastructure layer (shared components)
pub mod infrastructure;

// Re-export infrastructure modules for convenience
pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;
pub use infrastructure::redis;

// Domain layer (cache and rate limiting)
pub mod cache;
pub mod pubsub;
pub mod ratelimit;
pub mod session;

// Application layer
pub mod api;
pub mod server;
pub mod service;
