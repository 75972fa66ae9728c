use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use crate::telemetry::TracingConfig;

/// Root configuration for smppserver
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Listening endpoint and server identity
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-session protocol settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name, used in logs and management names
    #[serde(default = "default_name")]
    pub name: String,

    /// Bind address
    #[serde(default = "default_address")]
    pub address: SocketAddr,

    /// system_id returned in bind responses
    #[serde(default = "default_name")]
    pub system_id: String,

    /// Bounded wait for each session's disconnect during stop
    #[serde(default = "default_disconnect_timeout", with = "humantime_serde")]
    pub disconnect_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            address: default_address(),
            system_id: default_name(),
            disconnect_timeout: default_disconnect_timeout(),
        }
    }
}

fn default_name() -> String {
    "smppserver".to_string()
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 2775))
}

fn default_disconnect_timeout() -> Duration {
    Duration::from_millis(500)
}

/// Session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Maximum outstanding outbound requests per session
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// How long `send_request` may wait for a free window slot
    #[serde(default = "default_offer_timeout", with = "humantime_serde")]
    pub offer_timeout: Duration,

    /// Age after which an unanswered window entry is reclaimed
    #[serde(default = "default_expire_timeout", with = "humantime_serde")]
    pub expire_timeout: Duration,

    /// Response timeout for the unbind sent by `close`
    #[serde(default = "default_unbind_timeout", with = "humantime_serde")]
    pub unbind_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            offer_timeout: default_offer_timeout(),
            expire_timeout: default_expire_timeout(),
            unbind_timeout: default_unbind_timeout(),
        }
    }
}

fn default_window_size() -> usize {
    10
}

fn default_offer_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_expire_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_unbind_timeout() -> Duration {
    Duration::from_millis(500)
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub json_logs: bool,

    /// Trace every PDU a session reads or writes
    #[serde(default)]
    pub pdu_trace: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            pdu_trace: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TelemetryConfig {
    pub fn tracing(&self, service_name: &str) -> TracingConfig {
        TracingConfig {
            service_name: service_name.to_string(),
            log_level: self.log_level.clone(),
            json_logs: self.json_logs,
            pdu_trace: self.pdu_trace,
        }
    }
}
