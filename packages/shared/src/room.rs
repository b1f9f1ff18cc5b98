//! Room state model shared between server and client.

use serde::{Deserialize, Serialize};

/// A participant in the room.
///
/// Created when a session joins, removed when it disconnects. The typing
/// flag is mutated only by the server in response to typing events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Display name, unique within the room
    pub name: String,
    /// Whether the user currently has a non-empty input line
    pub is_typing: bool,
}

impl User {
    /// Create a new user with the typing flag cleared
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_typing: false,
        }
    }
}

/// Full point-in-time view of the room.
///
/// A new snapshot is built after every accepted mutation and broadcast
/// whole; there is no incremental diff protocol. Messages are already
/// formatted for display (`"<author>: <body>"` or `"[SERVER] <notice>"`)
/// and append-only, so their order is the arrival order at the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomState {
    /// Users currently in the room, in join order
    pub users: Vec<User>,
    /// Display-ready message lines, in arrival order
    pub messages: Vec<String>,
}

impl RoomState {
    /// The empty room, used for the client's initial render
    pub fn empty() -> Self {
        Self {
            users: Vec::new(),
            messages: Vec::new(),
        }
    }
}
