//! Error types for the chat client.

use thiserror::Error;

use idobata_shared::protocol::ProtocolError;

/// Client-specific errors. All of them are terminal: a failed session is
/// never retried.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// A received snapshot frame failed to decode
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Terminal setup or drawing failure
    #[error("Terminal error: {0}")]
    Terminal(#[from] std::io::Error),

    /// User name was empty after trimming
    #[error("user name is empty after trimming")]
    InvalidName,
}
