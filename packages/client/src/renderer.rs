//! Deterministic rendering of a room snapshot into a fixed-layout frame.
//!
//! [`render_frame`] is a pure function of the snapshot and viewport; the
//! impure pieces (terminal size query, raw mode, clear-and-redraw) live in
//! [`Screen`]. Every invalidation clears and redraws the whole frame; with
//! a line-buffered terminal and full-state snapshots there is nothing to
//! gain from incremental diffing here.

use std::io::Write;

use crossterm::{
    cursor::MoveTo,
    queue,
    terminal::{self, Clear, ClearType},
};

use idobata_shared::room::RoomState;

use crate::error::ClientError;

/// Fixed width of the right-hand user sidebar, in columns
pub const SIDEBAR_WIDTH: usize = 20;

const VERTICAL_RULE: char = '│';
const HORIZONTAL_RULE: char = '─';
/// Typing marker suffixed to a user's sidebar row
const TYPING_MARKER: char = '*';

/// Content rows for a viewport: the full terminal minus the rule and
/// prompt lines, grown to fit the message log so the user block stays
/// visible at the bottom even when history is short.
pub fn viewport_height(terminal_rows: u16, message_count: usize) -> usize {
    (terminal_rows as usize).saturating_sub(2).max(message_count)
}

/// Render a snapshot into a frame of exactly `height` content lines plus a
/// horizontal rule and a prompt line.
///
/// Each content line is `width - 1` columns: a left message column, a
/// vertical rule, the sidebar, a closing rule. Messages fill from the top;
/// the user block is aligned to the bottom of the sidebar. Overlong
/// messages and names are truncated to their column so the layout stays
/// fixed. When there are more users than rows, the rows beyond the top are
/// dropped (truncation, not scrolling) — a known limitation.
pub fn render_frame(state: &RoomState, width: usize, height: usize, prompt_name: &str) -> String {
    let message_width = width.saturating_sub(SIDEBAR_WIDTH + 3);
    let mut frame = String::new();

    for row in 0..height {
        let message = state.messages.get(row).map(String::as_str).unwrap_or("");
        push_cell(&mut frame, message, message_width);
        frame.push(VERTICAL_RULE);
        push_cell(&mut frame, &user_cell(state, row, height), SIDEBAR_WIDTH);
        frame.push(VERTICAL_RULE);
        frame.push_str("\r\n");
    }

    for _ in 0..width.saturating_sub(1) {
        frame.push(HORIZONTAL_RULE);
    }
    frame.push_str("\r\n");
    frame.push_str(prompt_name);
    frame.push_str("> ");

    frame
}

/// Sidebar content for one row: a user entry inside the bottom-aligned
/// block, blank above it.
fn user_cell(state: &RoomState, row: usize, height: usize) -> String {
    let block_start = height.saturating_sub(state.users.len());
    if row < block_start {
        return String::new();
    }

    // with more users than rows this skips the entries beyond the top
    let index = row - block_start + state.users.len().saturating_sub(height);
    match state.users.get(index) {
        Some(user) if user.is_typing => format!("{}{}", user.name, TYPING_MARKER),
        Some(user) => user.name.clone(),
        None => String::new(),
    }
}

/// Truncate or blank-pad `text` to exactly `width` columns.
fn push_cell(frame: &mut String, text: &str, width: usize) {
    let mut written = 0;
    for c in text.chars().take(width) {
        frame.push(c);
        written += 1;
    }
    for _ in written..width {
        frame.push(' ');
    }
}

/// Terminal-backed view: owns raw mode and performs the clear-and-redraw
/// per invalidation.
pub struct Screen {
    name: String,
}

impl Screen {
    /// Put the terminal into raw mode and take ownership of the display.
    pub fn new(name: String) -> Result<Self, ClientError> {
        terminal::enable_raw_mode()?;
        Ok(Self { name })
    }

    /// Replace the display with a fresh render of the snapshot.
    pub fn invalidate(&mut self, state: &RoomState) -> Result<(), ClientError> {
        let (cols, rows) = terminal::size().unwrap_or((80, 24));
        let height = viewport_height(rows, state.messages.len());
        let frame = render_frame(state, cols as usize, height, &self.name);

        let mut stdout = std::io::stdout();
        // Purge also drops the scrollback so stale frames cannot resurface
        queue!(
            stdout,
            Clear(ClearType::All),
            Clear(ClearType::Purge),
            MoveTo(0, 0)
        )?;
        write!(stdout, "{frame}")?;
        stdout.flush()?;
        Ok(())
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
