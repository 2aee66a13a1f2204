//! Engine configuration.
//!
//! Defaults match the fielded sensor network: CoT XML over UDP multicast
//! `224.0.0.1:6969`, ZeroMQ telemetry on 4224 and status on 4225. Every
//! value can come from a `config.toml` (via `--config`) or be overridden
//! per-field through environment variables.

use serde::Deserialize;
use tracing::{info, warn};

use rid_types::UaType;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Multicast group carrying CoT XML events.
    pub multicast_group: String,
    pub multicast_port: u16,
    /// Host running the ZeroMQ telemetry/status publishers.
    pub zmq_host: String,
    pub zmq_telemetry_port: u16,
    pub zmq_status_port: u16,
    /// Fixed reconnect interval for pub/sub transports, seconds.
    /// No backoff growth and no retry ceiling while running.
    pub reconnect_interval_secs: u64,
    /// Blocking-receive timeout so the shutdown flag is observed promptly.
    pub recv_timeout_ms: u64,
    /// Aircraft category assigned when no identity block is parseable.
    pub fallback_ua_type: UaType,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            multicast_group: std::env::var("DW_MULTICAST_GROUP")
                .unwrap_or_else(|_| "224.0.0.1".to_string()),
            multicast_port: std::env::var("DW_MULTICAST_PORT")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(6969),
            zmq_host: std::env::var("DW_ZMQ_HOST")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
            zmq_telemetry_port: std::env::var("DW_ZMQ_TELEMETRY_PORT")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(4224),
            zmq_status_port: std::env::var("DW_ZMQ_STATUS_PORT")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(4225),
            reconnect_interval_secs: std::env::var("DW_RECONNECT_SECS")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(5),
            recv_timeout_ms: std::env::var("DW_RECV_TIMEOUT_MS")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(500),
            fallback_ua_type: UaType::Other,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file, falling back to defaults if the file is
    /// missing or unparsable.
    pub fn load(path: Option<&str>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match std::fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<EngineConfig>(&raw) {
                Ok(cfg) => {
                    info!("Loaded config from {path}");
                    cfg
                }
                Err(e) => {
                    warn!("Failed to parse {path}: {e}, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read {path}: {e}, using defaults");
                Self::default()
            }
        }
    }

    pub fn multicast_addr(&self) -> String {
        format!("0.0.0.0:{}", self.multicast_port)
    }

    pub fn telemetry_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.zmq_host, self.zmq_telemetry_port)
    }

    pub fn status_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.zmq_host, self.zmq_status_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fielded_network() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.multicast_port, 6969);
        assert_eq!(cfg.zmq_telemetry_port, 4224);
        assert_eq!(cfg.zmq_status_port, 4225);
        assert_eq!(cfg.fallback_ua_type, UaType::Other);
    }

    #[test]
    fn endpoints_are_tcp_urls() {
        let cfg = EngineConfig::default();
        assert!(cfg.telemetry_endpoint().starts_with("tcp://"));
        assert!(cfg.status_endpoint().ends_with(":4225"));
    }
}
