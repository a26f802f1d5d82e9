use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 4001;
pub const DEFAULT_PATH: &str = "/";

/// Settings for one [`Session`](crate::Session).
///
/// Timeouts are opt-in: without them a hung peer stalls the affected
/// operation forever. The queue is unbounded unless `queue_capacity` is
/// set, in which case sends beyond the bound are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
    pub sender: String,
    /// Bound on connect, handshake and each write, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Bound on waiting for each inbound frame, in milliseconds.
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

impl SessionConfig {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            sender: sender.into(),
            timeout_ms: None,
            read_timeout_ms: None,
            queue_capacity: None,
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sender.trim().is_empty() {
            return Err(ConfigError::Invalid("sender cannot be empty"));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host cannot be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port cannot be 0"));
        }
        if !self.path.starts_with('/') {
            return Err(ConfigError::Invalid("path must start with '/'"));
        }
        if self.queue_capacity == Some(0) {
            return Err(ConfigError::Invalid("queue capacity must be at least 1"));
        }
        Ok(())
    }

    /// `ws://host:port/path`, the address the handshake targets.
    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.path)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_server() {
        let config = SessionConfig::new("alice");
        assert_eq!(config.url(), "ws://localhost:4001/");
        assert_eq!(config.timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_fills_in_defaults() {
        let config = SessionConfig::from_json_str(
            r#"{ "sender": "bob", "port": 9000, "timeout_ms": 1500, "queue_capacity": 64 }"#,
        )
        .expect("valid config");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 9000);
        assert_eq!(config.path, "/");
        assert_eq!(config.timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.read_timeout(), None);
        assert_eq!(config.queue_capacity, Some(64));
    }

    #[test]
    fn json_without_sender_fails() {
        let err = SessionConfig::from_json_str(r#"{ "host": "example.org" }"#)
            .expect_err("sender is required");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = SessionConfig::from_json_str(r#"{ "sender": "bob", "retries": 3 }"#)
            .expect_err("unknown field");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = SessionConfig::new("  ");
        assert!(config.validate().is_err());

        config = SessionConfig::new("alice");
        config.path = "chat".into();
        assert!(config.validate().is_err());

        config = SessionConfig::new("alice");
        config.port = 0;
        assert!(config.validate().is_err());

        config = SessionConfig::new("alice");
        config.queue_capacity = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{ "sender": "carol", "path": "/chat" }"#).expect("write");
        let config = SessionConfig::from_json_file(&path).expect("load");
        assert_eq!(config.url(), "ws://localhost:4001/chat");
    }
}
