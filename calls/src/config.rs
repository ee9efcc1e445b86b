//! Configuration for the call engine service.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::engine::DEFAULT_MEETING_TOPIC;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Lifecycle sweeper configuration
    pub sweeper: SweeperConfig,
    /// Logging and metrics configuration
    pub observability: ObservabilityConfig,
    /// Meeting provisioning configuration
    pub meetings: MeetingConfig,
    /// Seconds to wait for background tasks on shutdown
    pub shutdown_timeout: u64,
}

/// Lifecycle sweeper configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Whether the sweeper runs at all
    pub enabled: bool,
    /// Seconds between sweeps (at least 1)
    pub interval_secs: u64,
}

/// Logging and metrics configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter used when `RUST_LOG` is not a valid directive
    pub log_level: String,
    /// Whether to install the Prometheus exporter
    pub metrics_enabled: bool,
    /// Exporter bind host
    pub metrics_host: String,
    /// Exporter bind port
    pub metrics_port: u16,
}

/// Meeting provisioning configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingConfig {
    /// Topic given to every provisioned meeting
    pub topic: String,
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// # Environment Variables
    ///
    /// - `SWEEPER_ENABLED`: run the lifecycle sweeper (default: true)
    /// - `SWEEPER_INTERVAL_SECS`: seconds between sweeps (default: 60)
    /// - `RUST_LOG`: log filter (default: info)
    /// - `METRICS_ENABLED`: install the Prometheus exporter (default: false)
    /// - `METRICS_HOST`: exporter host (default: 0.0.0.0)
    /// - `METRICS_PORT`: exporter port (default: 9090)
    /// - `SHUTDOWN_TIMEOUT`: seconds to wait on shutdown (default: 10)
    /// - `MEETING_TOPIC`: meeting topic (default: "Skill Swap Session")
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            sweeper: SweeperConfig {
                enabled: parse_var(&lookup, "SWEEPER_ENABLED").unwrap_or(true),
                interval_secs: parse_var(&lookup, "SWEEPER_INTERVAL_SECS").unwrap_or(60u64).max(1),
            },
            observability: ObservabilityConfig {
                log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
                metrics_enabled: parse_var(&lookup, "METRICS_ENABLED").unwrap_or(false),
                metrics_host: lookup("METRICS_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                metrics_port: parse_var(&lookup, "METRICS_PORT").unwrap_or(9090),
            },
            meetings: MeetingConfig {
                topic: lookup("MEETING_TOPIC").unwrap_or_else(|| DEFAULT_MEETING_TOPIC.to_string()),
            },
            shutdown_timeout: parse_var(&lookup, "SHUTDOWN_TIMEOUT").unwrap_or(10),
        }
    }

    /// Time between sweeps
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweeper.interval_secs)
    }

    /// How long shutdown waits for the sweeper
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    /// Address the metrics exporter binds to
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn metrics_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!(
            "{}:{}",
            self.observability.metrics_host, self.observability.metrics_port
        )
        .parse()
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
