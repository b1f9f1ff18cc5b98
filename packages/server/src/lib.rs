//! WebSocket chat server implementation.

mod handler;
mod room;
mod runner;
mod signal;
mod state;

pub use room::{Room, RoomError};
pub use runner::{router, run_server};
pub use state::AppState;
