//! Runtime configuration loaded from environment variables.

use std::time::Duration;

/// Saga runtime configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `BUS_PARTITIONS` — partitions per topic (default: `8`)
/// - `SAGA_TIMEOUT_SECS` — how long an order may sit PENDING before the
///   reaper fails it (default: `30`)
/// - `REAPER_INTERVAL_SECS` — sweep cadence (default: `10`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub bus_partitions: usize,
    pub saga_timeout: Duration,
    pub reaper_interval: Duration,
    pub log_level: String,
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            bus_partitions: env_u64("BUS_PARTITIONS", 8) as usize,
            saga_timeout: Duration::from_secs(env_u64("SAGA_TIMEOUT_SECS", 30)),
            reaper_interval: Duration::from_secs(env_u64("REAPER_INTERVAL_SECS", 10)),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus_partitions: 8,
            saga_timeout: Duration::from_secs(30),
            reaper_interval: Duration::from_secs(10),
            log_level: "info".to_string(),
        }
    }
}
