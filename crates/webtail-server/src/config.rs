//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default listen address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value was out of range.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Configuration for the webtail server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Address to bind (default `"0.0.0.0:8080"`).
    pub addr: String,
    /// How often the source is drained, in milliseconds.
    pub flush_interval_ms: u64,
    /// Close the connection if no pong arrives for this many seconds.
    pub idle_timeout_secs: u64,
    /// Deadline for every outbound frame, in seconds.
    pub write_timeout_secs: u64,
    /// Largest inbound frame accepted from the client, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.into(),
            flush_interval_ms: 1_000,
            idle_timeout_secs: 60,
            write_timeout_secs: 10,
            max_message_size: 512,
        }
    }
}

impl ServerConfig {
    /// Reject values the streaming loops cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addr.trim().is_empty() {
            return Err(ConfigError::InvalidValue("addr must not be empty".into()));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "flush interval must be greater than zero".into(),
            ));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "idle timeout must be greater than zero".into(),
            ));
        }
        if self.write_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "write timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Timing contract for the streaming loops.
    pub fn timings(&self) -> StreamTimings {
        StreamTimings::from_idle_timeout(
            Duration::from_millis(self.flush_interval_ms),
            Duration::from_secs(self.idle_timeout_secs),
            Duration::from_secs(self.write_timeout_secs),
        )
    }
}

/// Periods and deadlines shared by the liveness monitor and the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamTimings {
    /// Period of the flush timer.
    pub flush_period: Duration,
    /// Period of the ping timer. Must be shorter than `idle_timeout`.
    pub ping_period: Duration,
    /// Idle-read deadline, reset on every pong.
    pub idle_timeout: Duration,
    /// Deadline for each outbound write.
    pub write_timeout: Duration,
}

impl StreamTimings {
    /// Build timings with the ping period at 9/10 of the idle timeout.
    pub fn from_idle_timeout(
        flush_period: Duration,
        idle_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            flush_period,
            ping_period: idle_timeout * 9 / 10,
            idle_timeout,
            write_timeout,
        }
    }
}

impl Default for StreamTimings {
    fn default() -> Self {
        ServerConfig::default().timings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_addr() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.addr, "0.0.0.0:8080");
    }

    #[test]
    fn default_timings() {
        let t = StreamTimings::default();
        assert_eq!(t.flush_period, Duration::from_secs(1));
        assert_eq!(t.idle_timeout, Duration::from_secs(60));
        assert_eq!(t.ping_period, Duration::from_secs(54));
        assert_eq!(t.write_timeout, Duration::from_secs(10));
    }

    #[test]
    fn ping_period_is_shorter_than_idle_timeout() {
        let t = StreamTimings::from_idle_timeout(
            Duration::from_millis(50),
            Duration::from_millis(500),
            Duration::from_millis(100),
        );
        assert_eq!(t.ping_period, Duration::from_millis(450));
        assert!(t.ping_period < t.idle_timeout);
    }

    #[test]
    fn default_max_message_size() {
        assert_eq!(ServerConfig::default().max_message_size, 512);
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_periods() {
        let cfg = ServerConfig {
            flush_interval_ms: 0,
            ..ServerConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ServerConfig {
            idle_timeout_secs: 0,
            ..ServerConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("idle timeout"));
    }

    #[test]
    fn validate_rejects_empty_addr() {
        let cfg = ServerConfig {
            addr: "  ".into(),
            ..ServerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn deserialize_partial_json_uses_defaults() {
        let cfg: ServerConfig = serde_json::from_str(r#"{"addr":"127.0.0.1:9000"}"#).unwrap();
        assert_eq!(cfg.addr, "127.0.0.1:9000");
        assert_eq!(cfg.flush_interval_ms, 1_000);
        assert_eq!(cfg.idle_timeout_secs, 60);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(ServerConfig::default()).unwrap();
        assert_eq!(json["flushIntervalMs"], 1000);
        assert_eq!(json["writeTimeoutSecs"], 10);
    }
}
