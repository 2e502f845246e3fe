//! Parsing of the store's `INFO` diagnostic text.
//!
//! `INFO` output is `field:value` lines with `\r\n` endings and
//! `# Section` headers. Missing fields default rather than failing the
//! whole report.

use serde::Serialize;

/// Health verdict for the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Result of a `health_check` call.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub connected: bool,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
}

impl HealthReport {
    pub fn unhealthy(backend: &str) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            connected: false,
            backend: backend.to_string(),
            latency_ms: None,
            version: None,
            memory_used: None,
            uptime_seconds: None,
        }
    }

    pub fn healthy(backend: &str, latency_ms: u64, info: &str) -> Self {
        Self {
            status: HealthStatus::Healthy,
            connected: true,
            backend: backend.to_string(),
            latency_ms: Some(latency_ms),
            version: info_field(info, "redis_version").map(str::to_string),
            memory_used: info_field(info, "used_memory_human").map(str::to_string),
            uptime_seconds: info_field_u64(info, "uptime_in_seconds"),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Statistics snapshot parsed from `INFO`.
///
/// Every field defaults to zero when absent; a snapshot is always
/// produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStatistics {
    pub connected_clients: u64,
    pub used_memory_bytes: u64,
    pub total_commands_processed: u64,
    pub keyspace_hits: u64,
    pub keyspace_misses: u64,
    pub hit_rate: f64,
}

impl CacheStatistics {
    pub fn from_info(info: &str) -> Self {
        let keyspace_hits = info_field_u64(info, "keyspace_hits").unwrap_or(0);
        let keyspace_misses = info_field_u64(info, "keyspace_misses").unwrap_or(0);
        let lookups = keyspace_hits + keyspace_misses;
        let hit_rate = if lookups > 0 {
            keyspace_hits as f64 / lookups as f64
        } else {
            0.0
        };

        Self {
            connected_clients: info_field_u64(info, "connected_clients").unwrap_or(0),
            used_memory_bytes: info_field_u64(info, "used_memory").unwrap_or(0),
            total_commands_processed: info_field_u64(info, "total_commands_processed")
                .unwrap_or(0),
            keyspace_hits,
            keyspace_misses,
            hit_rate,
        }
    }
}

/// Find one `field:value` line in `INFO` output.
pub(crate) fn info_field<'a>(info: &'a str, field: &str) -> Option<&'a str> {
    info.lines().find_map(|line| {
        let line = line.trim_end_matches('\r');
        let (name, value) = line.split_once(':')?;
        if name == field {
            Some(value)
        } else {
            None
        }
    })
}

fn info_field_u64(info: &str, field: &str) -> Option<u64> {
    info_field(info, field).and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_INFO: &str = "# Server\r\n\
        redis_version:7.2.4\r\n\
        uptime_in_seconds:86400\r\n\
        # Clients\r\n\
        connected_clients:12\r\n\
        # Memory\r\n\
        used_memory:1048576\r\n\
        used_memory_human:1.00M\r\n\
        # Stats\r\n\
        total_commands_processed:5000\r\n\
        keyspace_hits:400\r\n\
        keyspace_misses:100\r\n";

    #[test]
    fn test_info_field_lookup() {
        assert_eq!(info_field(SAMPLE_INFO, "redis_version"), Some("7.2.4"));
        assert_eq!(info_field(SAMPLE_INFO, "used_memory_human"), Some("1.00M"));
        assert_eq!(info_field(SAMPLE_INFO, "nonexistent"), None);
    }

    #[test]
    fn test_healthy_report_parses_details() {
        let report = HealthReport::healthy("redis", 3, SAMPLE_INFO);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.connected);
        assert_eq!(report.latency_ms, Some(3));
        assert_eq!(report.version.as_deref(), Some("7.2.4"));
        assert_eq!(report.memory_used.as_deref(), Some("1.00M"));
        assert_eq!(report.uptime_seconds, Some(86400));
    }

    #[test]
    fn test_healthy_report_tolerates_missing_fields() {
        let report = HealthReport::healthy("redis", 1, "# Server\r\n");
        assert!(report.is_healthy());
        assert!(report.version.is_none());
        assert!(report.uptime_seconds.is_none());
    }

    #[test]
    fn test_unhealthy_report() {
        let report = HealthReport::unhealthy("redis");
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(!report.connected);
        assert!(report.latency_ms.is_none());
    }

    #[test]
    fn test_statistics_from_info() {
        let stats = CacheStatistics::from_info(SAMPLE_INFO);
        assert_eq!(stats.connected_clients, 12);
        assert_eq!(stats.used_memory_bytes, 1_048_576);
        assert_eq!(stats.total_commands_processed, 5000);
        assert_eq!(stats.keyspace_hits, 400);
        assert_eq!(stats.keyspace_misses, 100);
        assert!((stats.hit_rate - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_statistics_default_to_zero() {
        let stats = CacheStatistics::from_info("# Server\r\nsome_field:abc\r\n");
        assert_eq!(stats.connected_clients, 0);
        assert_eq!(stats.used_memory_bytes, 0);
        assert_eq!(stats.keyspace_hits, 0);
        assert_eq!(stats.hit_rate, 0.0);
    }
}
