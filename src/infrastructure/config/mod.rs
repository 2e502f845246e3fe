mod settings;

pub use settings::{
    CacheBackendKind, RateLimitConfig, RedisConfig, ServerConfig, SessionConfig, Settings,
};
