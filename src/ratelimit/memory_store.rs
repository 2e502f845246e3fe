//! In-memory rate-limit store.
//!
//! The prune/count/record sequence runs under one mutex guard, which
//! is the in-process analogue of the Redis store's server-side script.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;

use super::{RateLimitStore, WindowOutcome};

pub struct MemoryRateLimitStore {
    windows: Mutex<HashMap<String, Vec<i64>>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn check(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        max_requests: u32,
    ) -> Result<WindowOutcome> {
        let window_start = now_ms - window_ms;
        let mut windows = self.windows.lock().expect("rate limit lock poisoned");
        let timestamps = windows.entry(key.to_string()).or_default();

        // Lazy expiry: keep only timestamps strictly newer than the
        // window start
        timestamps.retain(|&ts| ts > window_start);
        let count_before = timestamps.len() as u32;

        let admitted = count_before < max_requests;
        if admitted {
            timestamps.push(now_ms);
        }

        Ok(WindowOutcome {
            admitted,
            count_before,
        })
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.windows
            .lock()
            .expect("rate limit lock poisoned")
            .remove(key);
        Ok(())
    }
}
