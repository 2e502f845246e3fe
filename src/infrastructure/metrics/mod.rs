//! Prometheus metrics for the cache service.
//!
//! - Cache operation metrics (hits, misses, operation outcomes)
//! - Rate limiting metrics (allowed/rejected decisions)
//! - Pub/Sub metrics
//! - Connection status

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "astral_cache";

lazy_static! {
    /// Cache reads that found a value
    pub static ref CACHE_HITS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_hits_total", METRIC_PREFIX),
        "Cache reads that returned a value"
    ).unwrap();

    /// Cache reads that found nothing (or failed soft)
    pub static ref CACHE_MISSES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_misses_total", METRIC_PREFIX),
        "Cache reads that returned no value"
    ).unwrap();

    /// Cache operations by name and outcome
    pub static ref CACHE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_operations_total", METRIC_PREFIX),
        "Cache operations by operation and outcome",
        &["operation", "outcome"]
    ).unwrap();

    /// Rate-limit admission decisions
    pub static ref RATE_LIMIT_DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_rate_limit_decisions_total", METRIC_PREFIX),
        "Rate-limit checks by outcome (allowed, rejected, fail_open)",
        &["outcome"]
    ).unwrap();

    /// Messages published to the bus
    pub static ref PUBSUB_PUBLISHED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_pubsub_published_total", METRIC_PREFIX),
        "Messages published to the message bus"
    ).unwrap();

    /// Messages delivered to local subscribers
    pub static ref PUBSUB_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_pubsub_delivered_total", METRIC_PREFIX),
        "Messages delivered to subscriber callbacks"
    ).unwrap();

    /// Backing-store connection status (1 = connected, 0 = not)
    pub static ref CONNECTION_STATUS: IntGauge = register_int_gauge!(
        format!("{}_connection_status", METRIC_PREFIX),
        "Backing-store connection status (1 = connected)"
    ).unwrap();
}

/// Encode all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("invalid UTF-8 in metrics output: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_includes_registered_counters() {
        CACHE_HITS_TOTAL.inc();
        RATE_LIMIT_DECISIONS_TOTAL
            .with_label_values(&["allowed"])
            .inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("astral_cache_hits_total"));
        assert!(output.contains("astral_cache_rate_limit_decisions_total"));
    }
}
