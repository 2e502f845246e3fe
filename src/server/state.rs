use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::service::CacheService;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub service: Arc<CacheService>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, service: Arc<CacheService>) -> Self {
        Self {
            settings: Arc::new(settings),
            service,
            start_time: Instant::now(),
        }
    }
}
