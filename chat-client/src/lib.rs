//! Single-connection WebSocket chat client.
//!
//! One [`Session`] owns one connection and walks it through
//! `Connecting -> Handshaking -> Active -> Closed`. Outbound messages are
//! written strictly in `send` order with at most one write outstanding,
//! while a read loop delivers inbound messages to a [`MessageHandler`].
//!
//! - [`message`] is the chat event type and its payload variants.
//! - [`codec`] turns messages into protobuf frames and back.
//! - [`queue`] is the ordered outbound queue and its single-writer rule.
//! - [`transport`] abstracts connect/handshake/frame I/O, with a
//!   `tokio-tungstenite` implementation.
//! - [`session`] is the public handle; the driver task behind it lives in
//!   a private module.
//! - [`cli`], [`client`] and [`input`] make up the interactive terminal
//!   client shipped as the `ws-chat-client` binary.

pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
mod driver;
pub mod error;
pub mod input;
pub mod message;
pub mod queue;
pub mod session;
pub mod transport;

pub use codec::{Codec, DecodeError, ProtoCodec};
pub use config::SessionConfig;
pub use error::{SendError, SessionError, TransportError};
pub use message::{ChatMessage, MessageKind, Payload};
pub use session::{MessageHandler, Session, SessionState, SessionTask};
