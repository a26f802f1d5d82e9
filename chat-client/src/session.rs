//! Public handle to one chat connection.
//!
//! [`Session::spawn`] starts the driver task and returns a cloneable handle
//! plus the driver's `JoinHandle`, which resolves once with the session's
//! fatal error (or `Ok` after an explicit close).
//!
//! Sends are accepted from the moment the session exists. While it is still
//! connecting or handshaking they are buffered, and they are flushed in call
//! order as soon as it turns active. Once closed, every send is rejected with
//! [`SendError::SessionClosed`].

use std::sync::Arc;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    codec::{Codec, ProtoCodec},
    config::SessionConfig,
    driver::{Driver, DriverCommand},
    error::{SendError, SessionError},
    message::ChatMessage,
    queue::{Dispatch, OutboundQueue},
    transport::{Transport, WebSocketTransport},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    Handshaking,
    Active,
    Closed,
}

/// Receives every inbound message, in arrival order, on the driver task.
///
/// The next read is only issued after `on_message` returns, so slow
/// handlers apply backpressure to the connection.
pub trait MessageHandler: Send + 'static {
    fn on_message(&mut self, message: ChatMessage);
}

impl<F> MessageHandler for F
where
    F: FnMut(ChatMessage) + Send + 'static,
{
    fn on_message(&mut self, message: ChatMessage) {
        self(message)
    }
}

pub type SessionTask = JoinHandle<Result<(), SessionError>>;

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionShared>,
}

struct SessionShared {
    queue: Arc<OutboundQueue>,
    commands: mpsc::UnboundedSender<DriverCommand>,
    state: watch::Receiver<SessionState>,
}

impl Session {
    /// Connects over WebSocket and encodes messages with [`ProtoCodec`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect<H>(config: SessionConfig, handler: H) -> (Session, SessionTask)
    where
        H: MessageHandler,
    {
        Self::spawn(config, WebSocketTransport, ProtoCodec, handler)
    }

    pub fn spawn<T, C, H>(
        config: SessionConfig,
        transport: T,
        codec: C,
        handler: H,
    ) -> (Session, SessionTask)
    where
        T: Transport,
        C: Codec,
        H: MessageHandler,
    {
        let queue = Arc::new(OutboundQueue::new(config.queue_capacity));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        let driver = Driver {
            config,
            codec,
            handler,
            queue: Arc::clone(&queue),
            commands: command_rx,
            state: state_tx,
        };
        let task = tokio::spawn(driver.run(transport));

        let session = Session {
            inner: Arc::new(SessionShared {
                queue,
                commands: command_tx,
                state: state_rx,
            }),
        };
        (session, task)
    }

    /// Queues `message` for delivery after everything sent before it.
    pub fn send(&self, message: ChatMessage) -> Result<(), SendError> {
        match self.inner.queue.push(message)? {
            Dispatch::Queued => Ok(()),
            Dispatch::Write(front) => {
                if self.inner.commands.send(DriverCommand::Write(front)).is_err() {
                    // The driver is gone without having closed the queue,
                    // which only happens if it panicked.
                    warn!("driver task is gone, closing outbound queue");
                    let mut undelivered = self.inner.queue.close();
                    return match undelivered.pop() {
                        Some(message) => Err(SendError::SessionClosed(message)),
                        None => Ok(()),
                    };
                }
                Ok(())
            }
        }
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed || self.inner.queue.is_closed()
    }

    /// Resolves once the session is active, or with [`SessionError::Closed`]
    /// if it closes first.
    pub async fn wait_active(&self) -> Result<(), SessionError> {
        let mut state = self.inner.state.clone();
        let reached = state
            .wait_for(|state| matches!(state, SessionState::Active | SessionState::Closed))
            .await
            .map(|state| *state)
            .unwrap_or(SessionState::Closed);
        match reached {
            SessionState::Active => Ok(()),
            _ => Err(SessionError::Closed),
        }
    }

    /// Resolves once the session has reached [`SessionState::Closed`].
    pub async fn wait_closed(&self) {
        let mut state = self.inner.state.clone();
        // An error means the driver dropped its sender, so it has stopped.
        let _ = state.wait_for(|state| *state == SessionState::Closed).await;
    }

    /// Resolves once every message sent so far has been written, or the
    /// session has closed.
    pub async fn flush(&self) {
        self.inner.queue.wait_drained().await
    }

    /// Number of messages sent but not yet confirmed written.
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    /// Stops the session from any state.
    ///
    /// Further sends fail immediately. Messages still queued are dropped and
    /// logged; an in-flight write is abandoned.
    pub fn close(&self) {
        let dropped = self.inner.queue.close();
        if !dropped.is_empty() {
            warn!(count = dropped.len(), "closing with unsent messages");
        }
        if self.inner.commands.send(DriverCommand::Close).is_err() {
            debug!("close requested after the driver stopped");
        }
    }
}
