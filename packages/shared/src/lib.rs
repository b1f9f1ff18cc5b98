//! Shared library for the Idobata chat application.
//!
//! Holds the pieces both the server and the client depend on: the room
//! state model, the wire protocol codec, and logging setup.

pub mod logger;
pub mod protocol;
pub mod room;
