//! Shared server state.

use tokio::sync::Mutex;

use crate::room::Room;

/// Shared application state.
///
/// The room is the one shared mutable resource in the server. The single
/// mutex enforces the single-writer discipline: mutation, snapshot
/// construction, and broadcast initiation all happen under one lock, so a
/// broadcast can never observe a half-updated room.
pub struct AppState {
    /// Canonical room: users, message log, and live session registry
    pub room: Mutex<Room>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            room: Mutex::new(Room::new()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
