//! Wire messages exchanged with browser clients
//!
//! Every response uses the same envelope: `{message_type, payload, error?, info?}`.
//! Clients check `error`, then `info`, then dispatch on `message_type`.

use crate::model::{Annotation, Chunk};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Segment delivery: annotation metadata plus clipped audio
    AudioChunk,
    /// Aggregated counts, also pushed after every mutation
    Stats,
    Info,
    Error,
}

/// Response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl Message {
    pub fn payload(message_type: MessageType, payload: Value) -> Self {
        Self {
            message_type,
            payload,
            error: None,
            info: None,
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Info,
            payload: Value::Null,
            error: None,
            info: Some(text.into()),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Error,
            payload: Value::Null,
            error: Some(text.into()),
            info: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Payload of an `audio_chunk` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunkPayload {
    #[serde(flatten)]
    pub annotation: Annotation,
    /// Base64 encoded audio bytes
    pub audio: String,
    pub file_type: String,
    /// Position of the clip start within the source, in milliseconds
    pub offset: i64,
    /// The segment's chunk relative to the start of the clip
    pub relative_chunk: Chunk,
}
