use std::path::PathBuf;

use clap::Parser;

use crate::{
    config::{DEFAULT_HOST, DEFAULT_PATH, DEFAULT_PORT, SessionConfig},
    error::ConfigError,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Chat server host.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Chat server port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// WebSocket resource path requested during the handshake.
    #[arg(long, default_value = DEFAULT_PATH)]
    pub path: String,

    /// Nickname stamped on outgoing messages. Prompted for when omitted.
    #[arg(long)]
    pub nickname: Option<String>,

    /// Timeout for connect, handshake and each write, in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Give up when no frame arrives for this many milliseconds.
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    /// Reject messages once this many are waiting to be written.
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Save received images into this directory.
    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    /// JSON session config. Replaces the connection flags above; `--nickname`
    /// still overrides its sender.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Builds the session config, using `nickname` when the command line
    /// and config file do not name a sender.
    pub fn session_config(&self, nickname: Option<String>) -> Result<SessionConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_json_file(path)?,
            None => SessionConfig {
                host: self.host.clone(),
                port: self.port,
                path: self.path.clone(),
                sender: String::new(),
                timeout_ms: self.timeout_ms,
                read_timeout_ms: self.read_timeout_ms,
                queue_capacity: self.queue_capacity,
            },
        };

        if let Some(nickname) = self.nickname.clone().or(nickname) {
            config.sender = nickname.trim().to_string();
        }
        config.validate()?;
        Ok(config)
    }

    /// Whether a nickname has to be asked for interactively.
    pub fn needs_nickname(&self) -> bool {
        self.nickname.is_none() && self.config.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_build_config() {
        let cli = Cli::parse_from([
            "ws-chat-client",
            "--host",
            "chat.local",
            "--port",
            "9001",
            "--path",
            "/room",
            "--nickname",
            "alice",
            "--timeout-ms",
            "250",
        ]);
        assert!(!cli.needs_nickname());

        let config = cli.session_config(None).expect("config");
        assert_eq!(config.url(), "ws://chat.local:9001/room");
        assert_eq!(config.sender, "alice");
        assert_eq!(config.timeout_ms, Some(250));
    }

    #[test]
    fn prompted_nickname_is_used_when_flag_missing() {
        let cli = Cli::parse_from(["ws-chat-client"]);
        assert!(cli.needs_nickname());

        let config = cli.session_config(Some(" bob \n".into())).expect("config");
        assert_eq!(config.sender, "bob");
        assert_eq!(config.url(), "ws://localhost:4001/");
    }

    #[test]
    fn missing_nickname_fails_validation() {
        let cli = Cli::parse_from(["ws-chat-client"]);
        assert!(cli.session_config(None).is_err());
    }

    #[test]
    fn nickname_overrides_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{ "sender": "carol", "port": 5555 }"#).expect("write");

        let path_arg = path.to_string_lossy().into_owned();
        let cli = Cli::parse_from([
            "ws-chat-client",
            "--config",
            path_arg.as_str(),
            "--nickname",
            "dave",
        ]);
        let config = cli.session_config(None).expect("config");
        assert_eq!(config.sender, "dave");
        assert_eq!(config.port, 5555);
    }
}
