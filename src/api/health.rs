//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;
use crate::service::{CacheStatistics, HealthReport};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub cache: HealthReport,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub backend: String,
    pub connection: ConnectionStatsResponse,
    pub server: CacheStatistics,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatsResponse {
    pub state: String,
    pub connected: bool,
    pub connect_attempts: u32,
    pub total_reconnections: u32,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.service.health_check().await;
    let status = if report.is_healthy() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        cache: report,
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let server = state.service.get_statistics().await;

    let connection = match state.service.connection_stats() {
        Some(stats) => ConnectionStatsResponse {
            state: stats.state.as_str().to_string(),
            connected: state.service.is_healthy(),
            connect_attempts: stats.connect_attempts,
            total_reconnections: stats.total_reconnections,
        },
        None => ConnectionStatsResponse {
            state: "local".to_string(),
            connected: state.service.is_healthy(),
            connect_attempts: 0,
            total_reconnections: 0,
        },
    };

    Json(StatsResponse {
        backend: state.service.backend_type().to_string(),
        connection,
        server,
    })
}
