use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Discriminates which payload a [`ChatMessage`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Image { extension: String, data: Vec<u8> },
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Text(_) => MessageKind::Text,
            Payload::Image { .. } => MessageKind::Image,
        }
    }

    fn empty(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Text => Payload::Text(String::new()),
            MessageKind::Image => Payload::Image {
                extension: String::new(),
                data: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("sender cannot be empty")]
    EmptySender,
    #[error("cannot set a {attempted:?} payload on a {actual:?} message")]
    KindMismatch {
        actual: MessageKind,
        attempted: MessageKind,
    },
}

/// One chat event: who sent it, when, and what it carries.
///
/// The kind is derived from the payload, so the two can never disagree.
/// A message built for one kind only accepts the payload setter for that
/// kind; there is no way to turn a text message into an image message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    sender: String,
    timestamp: u32,
    payload: Payload,
}

impl ChatMessage {
    /// Builds a message of `kind` with an empty payload, to be filled with
    /// [`set_text`](Self::set_text) or [`set_image`](Self::set_image).
    pub fn new(
        sender: impl Into<String>,
        timestamp: u32,
        kind: MessageKind,
    ) -> Result<Self, MessageError> {
        Self::with_payload(sender, timestamp, Payload::empty(kind))
    }

    pub fn text(
        sender: impl Into<String>,
        timestamp: u32,
        text: impl Into<String>,
    ) -> Result<Self, MessageError> {
        Self::with_payload(sender, timestamp, Payload::Text(text.into()))
    }

    pub fn image(
        sender: impl Into<String>,
        timestamp: u32,
        extension: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<Self, MessageError> {
        Self::with_payload(
            sender,
            timestamp,
            Payload::Image {
                extension: extension.into(),
                data,
            },
        )
    }

    pub fn with_payload(
        sender: impl Into<String>,
        timestamp: u32,
        payload: Payload,
    ) -> Result<Self, MessageError> {
        let sender = sender.into();
        if sender.is_empty() {
            return Err(MessageError::EmptySender);
        }
        Ok(Self {
            sender,
            timestamp,
            payload,
        })
    }

    pub fn set_text(&mut self, text: impl Into<String>) -> Result<(), MessageError> {
        match &mut self.payload {
            Payload::Text(current) => {
                *current = text.into();
                Ok(())
            }
            Payload::Image { .. } => Err(MessageError::KindMismatch {
                actual: MessageKind::Image,
                attempted: MessageKind::Text,
            }),
        }
    }

    pub fn set_image(
        &mut self,
        extension: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<(), MessageError> {
        match &mut self.payload {
            Payload::Image {
                extension: current_extension,
                data: current_data,
            } => {
                *current_extension = extension.into();
                *current_data = data;
                Ok(())
            }
            Payload::Text(_) => Err(MessageError::KindMismatch {
                actual: MessageKind::Text,
                attempted: MessageKind::Image,
            }),
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            Payload::Image { .. } => None,
        }
    }
}

/// Seconds since the Unix epoch, saturating at `u32::MAX`.
pub fn unix_timestamp() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    u32::try_from(secs).unwrap_or(u32::MAX)
}
