//! Session storage helpers.
//!
//! Sessions are plain cache entries with a fixed `session:{id}` key
//! pattern and a default TTL; there is no logic here beyond key
//! construction.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{CacheBackend, SetOptions};
use crate::config::SessionConfig;
use crate::error::Result;

pub struct SessionStore {
    backend: Arc<dyn CacheBackend>,
    default_ttl_seconds: u64,
}

impl SessionStore {
    pub fn new(config: &SessionConfig, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            default_ttl_seconds: config.ttl_seconds,
        }
    }

    fn session_key(session_id: &str) -> String {
        format!("session:{}", session_id)
    }

    /// Store session data, defaulting the TTL to the configured value
    /// (3600 s unless overridden).
    pub async fn set_session<T: Serialize>(
        &self,
        session_id: &str,
        data: &T,
        ttl_seconds: Option<u64>,
    ) -> bool {
        let key = Self::session_key(session_id);
        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds);

        let payload = match serde_json::to_string(data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Session serialization failed");
                return false;
            }
        };

        self.backend
            .set_raw(&key, payload, &SetOptions::with_ttl(ttl))
            .await
    }

    pub async fn get_session<T: DeserializeOwned>(&self, session_id: &str) -> Option<T> {
        let key = Self::session_key(session_id);
        let payload = self.backend.get_raw(&key).await?;

        match serde_json::from_str(&payload) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Session deserialization failed");
                None
            }
        }
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        self.backend.del(&Self::session_key(session_id)).await
    }
}
