//! Transport boundary of the session.
//!
//! A [`Transport`] goes through two phases, mirroring the session states:
//! a raw `connect` and a protocol `handshake`, which yields a write half
//! and a read half that each move whole frames. [`WebSocketTransport`] is
//! the production implementation.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    WebSocketStream, client_async,
    tungstenite::{self, Message},
};
use tracing::{debug, warn};

use crate::{config::SessionConfig, error::TransportError};

#[async_trait]
pub trait Transport: Send + 'static {
    type Connection: Send + 'static;
    type Writer: FrameWriter;
    type Reader: FrameReader;

    async fn connect(&mut self, config: &SessionConfig) -> Result<Self::Connection, TransportError>;

    async fn handshake(
        &mut self,
        connection: Self::Connection,
        config: &SessionConfig,
    ) -> Result<(Self::Writer, Self::Reader), TransportError>;
}

#[async_trait]
pub trait FrameWriter: Send + 'static {
    /// Writes one binary frame.
    async fn write_frame(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait FrameReader: Send + 'static {
    /// Waits for the next complete frame; `Ok(None)` means the peer closed.
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Runs `operation`, failing with [`TransportError::TimedOut`] once `limit` elapses.
pub async fn bounded<T, F>(limit: Option<Duration>, operation: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| TransportError::TimedOut(limit))?,
        None => operation.await,
    }
}

/// WebSocket over plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

pub type WsStream = WebSocketStream<TcpStream>;

#[async_trait]
impl Transport for WebSocketTransport {
    type Connection = TcpStream;
    type Writer = WebSocketWriter;
    type Reader = WebSocketReader;

    async fn connect(&mut self, config: &SessionConfig) -> Result<TcpStream, TransportError> {
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        if let Err(error) = stream.set_nodelay(true) {
            debug!(?error, "failed to disable nagle");
        }
        Ok(stream)
    }

    async fn handshake(
        &mut self,
        connection: TcpStream,
        config: &SessionConfig,
    ) -> Result<(WebSocketWriter, WebSocketReader), TransportError> {
        let (stream, response) = client_async(config.url(), connection).await?;
        debug!(status = %response.status(), "websocket upgrade accepted");
        let (sink, stream) = stream.split();
        Ok((WebSocketWriter { sink }, WebSocketReader { stream }))
    }
}

pub struct WebSocketWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameWriter for WebSocketWriter {
    async fn write_frame(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.sink.send(Message::Binary(frame)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink.close().await?;
        Ok(())
    }
}

pub struct WebSocketReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameReader for WebSocketReader {
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(tungstenite::Error::ConnectionClosed)) | None => return Ok(None),
                Some(Err(error)) => return Err(error.into()),
            };

            match message {
                Message::Binary(frame) => return Ok(Some(frame)),
                Message::Text(text) => {
                    warn!(len = text.len(), "received text frame, decoding its bytes");
                    return Ok(Some(text.into_bytes()));
                }
                Message::Close(frame) => {
                    debug!(?frame, "peer sent close frame");
                    return Ok(None);
                }
                // Pongs are queued by tungstenite itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}
