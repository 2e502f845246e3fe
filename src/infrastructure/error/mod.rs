use thiserror::Error;

/// Errors surfaced by the cache service.
///
/// Most read/write paths absorb failures and return safe defaults
/// instead of propagating these; the variants below reach callers only
/// on the paths that deliberately fail hard (`del`/`exists`/`expire`,
/// pub/sub in a store-less configuration, and `initialize`).
#[derive(Debug, Error)]
pub enum CacheError {
    /// Operation requires a backing store but the service was built
    /// with the no-op adapters
    #[error("cache service is not initialized")]
    NotInitialized,

    /// `initialize` exhausted its connection attempts
    #[error("failed to connect to Redis after {attempts} attempts: {source}")]
    ConnectionFailed {
        attempts: u32,
        #[source]
        source: redis::RedisError,
    },

    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Value could not be serialized or deserialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, CacheError>;
