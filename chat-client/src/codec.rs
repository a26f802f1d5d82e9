//! Binary wire format for chat messages.
//!
//! The default [`ProtoCodec`] uses a protobuf schema with one field per
//! message attribute. The session only sees the [`Codec`] trait, so any
//! other self-delimited format can be swapped in.

use prost::Message as ProstMessage;
use thiserror::Error;

use crate::message::{ChatMessage, MessageError, Payload};

/// Converts chat messages to frame bytes and back.
pub trait Codec: Send + 'static {
    fn encode(&self, message: &ChatMessage) -> Vec<u8>;

    fn decode(&self, bytes: &[u8]) -> Result<ChatMessage, DecodeError>;
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] prost::DecodeError),
    #[error("unknown data type {0}")]
    UnknownDataType(i32),
    #[error("{data_type:?} frame carries fields of the other payload")]
    MixedPayload { data_type: DataType },
    #[error("invalid message: {0}")]
    Invalid(#[from] MessageError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum DataType {
    Text = 0,
    Image = 1,
}

/// `chat.ChatMessage` as it appears on the wire.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WireChatMessage {
    #[prost(string, tag = "1")]
    pub user_name: String,
    #[prost(uint32, tag = "2")]
    pub timestamp: u32,
    #[prost(enumeration = "DataType", tag = "3")]
    pub data_type: i32,
    #[prost(string, tag = "4")]
    pub message_text: String,
    #[prost(string, tag = "5")]
    pub image_extension: String,
    #[prost(bytes = "vec", tag = "6")]
    pub image_data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProtoCodec;

impl Codec for ProtoCodec {
    fn encode(&self, message: &ChatMessage) -> Vec<u8> {
        let mut wire = WireChatMessage {
            user_name: message.sender().to_string(),
            timestamp: message.timestamp(),
            ..Default::default()
        };

        match message.payload() {
            Payload::Text(text) => {
                wire.data_type = DataType::Text as i32;
                wire.message_text = text.clone();
            }
            Payload::Image { extension, data } => {
                wire.data_type = DataType::Image as i32;
                wire.image_extension = extension.clone();
                wire.image_data = data.clone();
            }
        }

        wire.encode_to_vec()
    }

    fn decode(&self, bytes: &[u8]) -> Result<ChatMessage, DecodeError> {
        let wire = WireChatMessage::decode(bytes)?;
        let data_type = DataType::try_from(wire.data_type)
            .map_err(|_| DecodeError::UnknownDataType(wire.data_type))?;

        let payload = match data_type {
            DataType::Text => {
                if !wire.image_extension.is_empty() || !wire.image_data.is_empty() {
                    return Err(DecodeError::MixedPayload { data_type });
                }
                Payload::Text(wire.message_text)
            }
            DataType::Image => {
                if !wire.message_text.is_empty() {
                    return Err(DecodeError::MixedPayload { data_type });
                }
                Payload::Image {
                    extension: wire.image_extension,
                    data: wire.image_data,
                }
            }
        };

        Ok(ChatMessage::with_payload(
            wire.user_name,
            wire.timestamp,
            payload,
        )?)
    }
}
