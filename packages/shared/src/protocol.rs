//! Wire protocol codec.
//!
//! Two message shapes travel over the WebSocket:
//!
//! - Client → server events, pipe-delimited text:
//!   `"<name>|message|<body>"`, `"<name>|startedTyping"`,
//!   `"<name>|stoppedTyping"`. The delimiter is reserved for framing and is
//!   illegal inside `<body>`; the input side never produces it, and a frame
//!   carrying one decodes to the wrong field count and is rejected.
//! - Server → client snapshots: the full [`RoomState`] as JSON, re-sent
//!   whole after every accepted mutation.

use thiserror::Error;

use crate::room::RoomState;

/// Frame delimiter for client events
pub const DELIMITER: char = '|';

/// Maximum byte length of a user name on the wire
pub const MAX_NAME_BYTES: usize = 32;

/// Errors raised while decoding or encoding frames.
///
/// Callers must not crash on these: the offending frame is dropped, the
/// session continues, and no snapshot is sent in response.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Event frame did not split into a known number of fields
    #[error("event frame has {0} fields, expected 2 or 3")]
    FieldCount(usize),

    /// Event frame named a command this protocol does not know
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Event frame carried an empty sender name
    #[error("event frame has an empty sender name")]
    EmptyName,

    /// Snapshot failed JSON schema validation
    #[error("malformed snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// A client-originated state-change request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Completed chat message
    Message { name: String, body: String },
    /// Input line went from empty to non-empty
    StartedTyping { name: String },
    /// Input line was submitted or emptied
    StoppedTyping { name: String },
}

impl ClientEvent {
    /// Encode the event into its pipe-delimited wire form.
    pub fn encode(&self) -> String {
        match self {
            Self::Message { name, body } => format!("{name}{DELIMITER}message{DELIMITER}{body}"),
            Self::StartedTyping { name } => format!("{name}{DELIMITER}startedTyping"),
            Self::StoppedTyping { name } => format!("{name}{DELIMITER}stoppedTyping"),
        }
    }

    /// Decode a pipe-delimited event frame.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] for wrong field counts, unknown commands,
    /// or an empty sender name.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let parts: Vec<&str> = frame.split(DELIMITER).collect();
        let event = match parts.as_slice() {
            [name, "message", body] => Self::Message {
                name: (*name).to_string(),
                body: (*body).to_string(),
            },
            [name, "startedTyping"] => Self::StartedTyping {
                name: (*name).to_string(),
            },
            [name, "stoppedTyping"] => Self::StoppedTyping {
                name: (*name).to_string(),
            },
            [_, command] => return Err(ProtocolError::UnknownCommand((*command).to_string())),
            [_, command, _] => return Err(ProtocolError::UnknownCommand((*command).to_string())),
            _ => return Err(ProtocolError::FieldCount(parts.len())),
        };

        if event.name().is_empty() {
            return Err(ProtocolError::EmptyName);
        }

        Ok(event)
    }

    /// Sender name carried by the event
    pub fn name(&self) -> &str {
        match self {
            Self::Message { name, .. } | Self::StartedTyping { name } | Self::StoppedTyping { name } => name,
        }
    }
}

/// Encode a room snapshot for broadcast.
pub fn encode_snapshot(state: &RoomState) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(state)?)
}

/// Decode a room snapshot received from the server.
pub fn decode_snapshot(frame: &str) -> Result<RoomState, ProtocolError> {
    Ok(serde_json::from_str(frame)?)
}

/// Trim a raw name frame and cap it at [`MAX_NAME_BYTES`] on a char boundary.
pub fn sanitize_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut end = trimmed.len().min(MAX_NAME_BYTES);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
