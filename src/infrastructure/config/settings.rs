use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub ratelimit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Which storage adapter backs the cache, rate limiter, and message bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// Real Redis adapters (production)
    Redis,
    /// In-process adapters (tests, single-instance deployments)
    Memory,
    /// No-op adapters for store-less contexts
    Noop,
}

impl Default for CacheBackendKind {
    fn default() -> Self {
        CacheBackendKind::Redis
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db: i64,
    /// Namespace prefix applied to every key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Connection attempts before `initialize` gives up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay between attempts; scales linearly with the attempt number
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub backend: CacheBackendKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Prefix for rate-limit window keys
    #[serde(default = "default_ratelimit_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_max_requests")]
    pub default_max_requests: u32,
    #[serde(default = "default_window_seconds")]
    pub default_window_seconds: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_key_prefix() -> String {
    "astral-turf:".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_ratelimit_prefix() -> String {
    "rate_limit".to_string()
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_seconds() -> u64 {
    60
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8090)?
            .set_default("redis.host", "localhost")?
            .set_default("redis.port", 6379)?
            .set_default("session.ttl_seconds", 3600)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false));

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.redis.apply_env_overrides();
        Ok(settings)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl RedisConfig {
    /// Apply the documented environment variable overrides on top of
    /// whatever the config files provided.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = env::var("REDIS_HOST") {
            self.host = host;
        }
        if let Ok(port) = env::var("REDIS_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            } else {
                tracing::warn!(value = %port, "Ignoring unparseable REDIS_PORT");
            }
        }
        if let Ok(password) = env::var("REDIS_PASSWORD") {
            if !password.is_empty() {
                self.password = Some(password);
            }
        }
        if let Ok(db) = env::var("REDIS_DB") {
            if let Ok(db) = db.parse() {
                self.db = db;
            } else {
                tracing::warn!(value = %db, "Ignoring unparseable REDIS_DB");
            }
        }
        if let Ok(prefix) = env::var("REDIS_KEY_PREFIX") {
            self.key_prefix = prefix;
        }
    }

    /// Build the connection URL consumed by the Redis client.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            db: 0,
            key_prefix: default_key_prefix(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            backend: CacheBackendKind::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_ratelimit_prefix(),
            default_max_requests: default_max_requests(),
            default_window_seconds: default_window_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let redis = RedisConfig::default();
        assert_eq!(redis.host, "localhost");
        assert_eq!(redis.port, 6379);
        assert_eq!(redis.db, 0);
        assert_eq!(redis.key_prefix, "astral-turf:");
        assert_eq!(redis.max_retries, 3);
        assert_eq!(redis.retry_delay_ms, 1000);
        assert_eq!(redis.backend, CacheBackendKind::Redis);

        let session = SessionConfig::default();
        assert_eq!(session.ttl_seconds, 3600);

        let ratelimit = RateLimitConfig::default();
        assert_eq!(ratelimit.key_prefix, "rate_limit");
    }

    #[test]
    fn test_url_without_password() {
        let redis = RedisConfig::default();
        assert_eq!(redis.url(), "redis://localhost:6379/0");
    }

    #[test]
    fn test_url_with_password() {
        let redis = RedisConfig {
            password: Some("secret".to_string()),
            db: 2,
            ..Default::default()
        };
        assert_eq!(redis.url(), "redis://:secret@localhost:6379/2");
    }

    // Single test for all REDIS_* variables: they share process-global
    // environment state, so the set/assert/clear sequence must not run
    // concurrently with itself.
    #[test]
    fn test_env_overrides() {
        env::set_var("REDIS_HOST", "redis.internal");
        env::set_var("REDIS_PORT", "6380");
        env::set_var("REDIS_PASSWORD", "hunter2");
        env::set_var("REDIS_DB", "3");
        env::set_var("REDIS_KEY_PREFIX", "trial:");

        let mut redis = RedisConfig::default();
        redis.apply_env_overrides();

        assert_eq!(redis.host, "redis.internal");
        assert_eq!(redis.port, 6380);
        assert_eq!(redis.password.as_deref(), Some("hunter2"));
        assert_eq!(redis.db, 3);
        assert_eq!(redis.key_prefix, "trial:");
        assert_eq!(redis.url(), "redis://:hunter2@redis.internal:6380/3");

        // Unparseable numeric values are ignored, not propagated
        env::set_var("REDIS_PORT", "not-a-port");
        env::set_var("REDIS_DB", "not-a-db");
        let mut redis = RedisConfig::default();
        redis.apply_env_overrides();
        assert_eq!(redis.port, 6379);
        assert_eq!(redis.db, 0);

        for var in [
            "REDIS_HOST",
            "REDIS_PORT",
            "REDIS_PASSWORD",
            "REDIS_DB",
            "REDIS_KEY_PREFIX",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_backend_kind_deserializes_lowercase() {
        let kind: CacheBackendKind = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(kind, CacheBackendKind::Memory);
        let kind: CacheBackendKind = serde_json::from_str("\"noop\"").unwrap();
        assert_eq!(kind, CacheBackendKind::Noop);
    }
}
