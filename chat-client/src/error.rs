use std::{io, time::Duration};

use thiserror::Error;

use crate::message::ChatMessage;

/// Failure of a single transport operation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),
    #[error("connection closed by peer")]
    PeerClosed,
}

/// Fatal outcome of a session, reported once when the driver stops.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to {endpoint}")]
    Connect {
        endpoint: String,
        #[source]
        source: TransportError,
    },
    #[error("handshake with {endpoint} failed")]
    Handshake {
        endpoint: String,
        #[source]
        source: TransportError,
    },
    #[error("write failed, {} message(s) undelivered", undelivered.len())]
    Write {
        #[source]
        source: TransportError,
        /// The message whose write failed, followed by everything still queued.
        undelivered: Vec<ChatMessage>,
    },
    #[error("read failed, {} message(s) undelivered", undelivered.len())]
    Read {
        #[source]
        source: TransportError,
        /// Messages queued or in flight when the connection went away.
        undelivered: Vec<ChatMessage>,
    },
    #[error("session closed")]
    Closed,
}

/// Rejected [`Session::send`](crate::Session::send); the message is handed back.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("session closed")]
    SessionClosed(ChatMessage),
    #[error("outbound queue is full ({capacity} messages)")]
    QueueFull {
        message: ChatMessage,
        capacity: usize,
    },
}

impl SendError {
    pub fn into_message(self) -> ChatMessage {
        match self {
            SendError::SessionClosed(message) => message,
            SendError::QueueFull { message, .. } => message,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}
