//! The single task that owns the connection.
//!
//! Every transport operation and every completion runs here, one at a time.
//! The active phase keeps exactly one read future and at most one write
//! future alive and selects over them together with commands coming from
//! [`Session`](crate::Session) handles.

use std::{error::Error as _, future::Future, pin::Pin, sync::Arc, time::Duration};

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::{
    codec::Codec,
    config::SessionConfig,
    error::{SessionError, TransportError},
    message::ChatMessage,
    queue::OutboundQueue,
    session::{MessageHandler, SessionState},
    transport::{FrameReader, FrameWriter, Transport, bounded},
};

/// Upper bound on finishing a write and closing the sink when
/// `timeout_ms` is not configured.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

type Pending<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type ReadOutcome<R> = (R, Result<Option<Vec<u8>>, TransportError>);
type WriteOutcome<W> = (W, Result<(), TransportError>);

#[derive(Debug)]
pub(crate) enum DriverCommand {
    /// The queue handed out its front message; write it.
    Write(Arc<ChatMessage>),
    Close,
}

pub(crate) struct Driver<C, H> {
    pub(crate) config: SessionConfig,
    pub(crate) codec: C,
    pub(crate) handler: H,
    pub(crate) queue: Arc<OutboundQueue>,
    pub(crate) commands: mpsc::UnboundedReceiver<DriverCommand>,
    pub(crate) state: watch::Sender<SessionState>,
}

impl<C, H> Driver<C, H>
where
    C: Codec,
    H: MessageHandler,
{
    pub(crate) async fn run<T: Transport>(mut self, transport: T) -> Result<(), SessionError> {
        let endpoint = self.config.url();
        info!(%endpoint, sender = %self.config.sender, "session starting");

        let outcome = self.drive(transport).await;

        let dropped = self.queue.close();
        if !dropped.is_empty() {
            warn!(count = dropped.len(), "discarding messages that were never written");
        }
        self.set_state(SessionState::Closed);

        match &outcome {
            Ok(()) => info!(%endpoint, "session closed"),
            Err(error) => error!(%endpoint, error = %error_chain(error), "session terminated"),
        }
        outcome
    }

    async fn drive<T: Transport>(&mut self, mut transport: T) -> Result<(), SessionError> {
        let config = self.config.clone();
        let endpoint = config.url();
        let limit = config.timeout();

        self.set_state(SessionState::Connecting);
        let connection = match self
            .until_close(bounded(limit, transport.connect(&config)))
            .await
        {
            Some(Ok(connection)) => connection,
            Some(Err(source)) => return Err(SessionError::Connect { endpoint, source }),
            None => return Ok(()),
        };

        self.set_state(SessionState::Handshaking);
        let (writer, reader) = match self
            .until_close(bounded(limit, transport.handshake(connection, &config)))
            .await
        {
            Some(Ok(halves)) => halves,
            Some(Err(source)) => return Err(SessionError::Handshake { endpoint, source }),
            None => return Ok(()),
        };

        self.set_state(SessionState::Active);
        self.run_active(writer, reader).await
    }

    /// Waits for `operation` unless a close arrives first, in which case the
    /// operation is abandoned and `None` is returned.
    async fn until_close<F, T>(&mut self, operation: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        tokio::pin!(operation);
        loop {
            tokio::select! {
                result = &mut operation => return Some(result),
                command = self.commands.recv() => match command {
                    Some(DriverCommand::Close) | None => {
                        debug!("close requested before the session became active");
                        return None;
                    }
                    Some(DriverCommand::Write(_)) => {
                        warn!("write dispatched before the session became active");
                    }
                },
            }
        }
    }

    /// Runs until a fatal I/O error or a close request; only the latter is `Ok`.
    async fn run_active<W, R>(&mut self, writer: W, reader: R) -> Result<(), SessionError>
    where
        W: FrameWriter,
        R: FrameReader,
    {
        let read_limit = self.config.read_timeout();
        let mut idle_writer = Some(writer);
        let mut write_op: Option<Pending<WriteOutcome<W>>> = None;
        let mut read_op = read_next(reader, read_limit);

        if let Some(front) = self.queue.attach() {
            write_op = self.start_write(&mut idle_writer, front);
        }

        loop {
            tokio::select! {
                (reader, result) = &mut read_op => match result {
                    Ok(Some(frame)) => {
                        self.deliver(&frame);
                        read_op = read_next(reader, read_limit);
                    }
                    Ok(None) => return Err(self.read_failed(TransportError::PeerClosed)),
                    Err(source) => return Err(self.read_failed(source)),
                },
                (writer, result) = poll_write(&mut write_op), if write_op.is_some() => {
                    write_op = None;
                    if let Err(source) = result {
                        // Nothing is retried: the failed message and the rest
                        // of the queue go back to the caller.
                        let undelivered = self.queue.close();
                        return Err(SessionError::Write { source, undelivered });
                    }
                    idle_writer = Some(writer);
                    if let Some(next) = self.queue.complete_write() {
                        write_op = self.start_write(&mut idle_writer, next);
                    }
                },
                command = self.commands.recv() => match command {
                    Some(DriverCommand::Write(front)) => {
                        if let Some(op) = self.start_write(&mut idle_writer, front) {
                            write_op = Some(op);
                        }
                    }
                    Some(DriverCommand::Close) | None => {
                        let writer = match write_op.take() {
                            Some(op) => self.finish_in_flight(op).await,
                            None => idle_writer.take(),
                        };
                        if let Some(mut writer) = writer {
                            let limit = Some(self.close_limit());
                            if let Err(error) = bounded(limit, writer.close()).await {
                                debug!(%error, "failed to close transport cleanly");
                            }
                        }
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Lets the current write complete without advancing the queue, so no
    /// further write is started.
    async fn finish_in_flight<W>(&mut self, op: Pending<WriteOutcome<W>>) -> Option<W> {
        let limit = self.close_limit();
        match tokio::time::timeout(limit, op).await {
            Ok((writer, result)) => {
                if let Err(error) = result {
                    debug!(%error, "in-flight write failed during close");
                }
                Some(writer)
            }
            Err(_) => {
                debug!(?limit, "abandoning in-flight write, no close frame sent");
                None
            }
        }
    }

    fn close_limit(&self) -> Duration {
        self.config.timeout().unwrap_or(CLOSE_GRACE)
    }

    fn read_failed(&self, source: TransportError) -> SessionError {
        let undelivered = self.queue.close();
        SessionError::Read {
            source,
            undelivered,
        }
    }

    fn start_write<W: FrameWriter>(
        &self,
        idle_writer: &mut Option<W>,
        message: Arc<ChatMessage>,
    ) -> Option<Pending<WriteOutcome<W>>> {
        let Some(mut writer) = idle_writer.take() else {
            // The queue hands out one message at a time, so the writer is
            // always idle when a write is dispatched.
            error!("write dispatched while another write is in flight");
            return None;
        };

        let frame = self.codec.encode(&message);
        let limit = self.config.timeout();
        debug!(bytes = frame.len(), kind = ?message.kind(), "writing frame");
        Some(Box::pin(async move {
            let result = bounded(limit, writer.write_frame(frame)).await;
            (writer, result)
        }))
    }

    fn deliver(&mut self, frame: &[u8]) {
        match self.codec.decode(frame) {
            Ok(message) => self.handler.on_message(message),
            Err(error) => warn!(%error, bytes = frame.len(), "discarding malformed frame"),
        }
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "session state changed");
        }
    }
}

fn read_next<R: FrameReader>(mut reader: R, limit: Option<Duration>) -> Pending<ReadOutcome<R>> {
    Box::pin(async move {
        let result = bounded(limit, reader.read_frame()).await;
        (reader, result)
    })
}

async fn poll_write<W>(write_op: &mut Option<Pending<WriteOutcome<W>>>) -> WriteOutcome<W> {
    match write_op {
        Some(op) => op.await,
        None => std::future::pending().await,
    }
}

fn error_chain(error: &SessionError) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
