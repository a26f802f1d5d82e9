//! Ordered outbound queue with a single-writer discipline.
//!
//! Producers append from any thread. Whoever flips `write_in_flight` from
//! false to true receives the front message and is responsible for handing
//! it to the driver; everyone else only appends. The driver reports each
//! completed write, and the queue answers with the next message to write
//! while keeping the flag set, so at most one write is ever outstanding.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::Notify;

use crate::{error::SendError, message::ChatMessage};

/// What the caller of [`OutboundQueue::push`] has to do next.
#[derive(Debug)]
pub enum Dispatch {
    /// No write was in flight; the caller must dispatch this message.
    Write(Arc<ChatMessage>),
    /// Another write is outstanding, or the driver is not attached yet.
    Queued,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Arc<ChatMessage>>,
    write_in_flight: bool,
    attached: bool,
    closed: bool,
}

impl QueueState {
    /// Claims the writer role if it is free and there is something to write.
    fn claim_front(&mut self) -> Option<Arc<ChatMessage>> {
        if !self.attached || self.write_in_flight {
            return None;
        }
        let front = self.pending.front().cloned()?;
        self.write_in_flight = true;
        Some(front)
    }
}

#[derive(Debug)]
pub struct OutboundQueue {
    state: Mutex<QueueState>,
    capacity: Option<usize>,
    settled: Notify,
}

impl OutboundQueue {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity,
            settled: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Every critical section leaves the state consistent, so a panic
        // elsewhere while holding the guard does not invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `message` at the back.
    ///
    /// Messages pushed before the driver attaches are buffered and flushed
    /// in order once it does.
    pub fn push(&self, message: ChatMessage) -> Result<Dispatch, SendError> {
        let mut state = self.lock();
        if state.closed {
            return Err(SendError::SessionClosed(message));
        }
        if let Some(capacity) = self.capacity {
            if state.pending.len() >= capacity {
                return Err(SendError::QueueFull { message, capacity });
            }
        }

        state.pending.push_back(Arc::new(message));
        Ok(match state.claim_front() {
            Some(front) => Dispatch::Write(front),
            None => Dispatch::Queued,
        })
    }

    /// Marks the driver as ready to write and returns the first message to
    /// write if anything was buffered in the meantime.
    pub fn attach(&self) -> Option<Arc<ChatMessage>> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.attached = true;
        state.claim_front()
    }

    /// Pops the message that was just written and returns the next one.
    ///
    /// When `Some` is returned the write-in-flight flag stays set and the
    /// caller owns the next write.
    pub fn complete_write(&self) -> Option<Arc<ChatMessage>> {
        let mut state = self.lock();
        debug_assert!(
            state.write_in_flight || state.closed,
            "completion without a write in flight"
        );
        state.pending.pop_front();
        state.write_in_flight = false;
        if state.closed {
            return None;
        }
        let next = state.claim_front();
        if next.is_none() {
            self.settled.notify_waiters();
        }
        next
    }

    /// Rejects all further pushes and returns everything not yet confirmed
    /// written, front first. Later calls return an empty list.
    pub fn close(&self) -> Vec<ChatMessage> {
        let mut state = self.lock();
        state.closed = true;
        state.write_in_flight = false;
        let undelivered = state
            .pending
            .drain(..)
            .map(|message| Arc::try_unwrap(message).unwrap_or_else(|shared| (*shared).clone()))
            .collect();
        self.settled.notify_waiters();
        undelivered
    }

    /// Resolves once every queued message has been written, or the queue
    /// has been closed.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_settled() {
                return;
            }
            notified.await;
        }
    }

    fn is_settled(&self) -> bool {
        let state = self.lock();
        state.closed || state.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    pub fn write_in_flight(&self) -> bool {
        self.lock().write_in_flight
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
