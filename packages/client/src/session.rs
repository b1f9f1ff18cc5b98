//! Client session: one connection, two concurrently scheduled activities.
//!
//! The sync loop receives snapshot frames and redraws; the writer drains
//! the input thread's event channel into the socket. The two share only
//! the transport and the pending typed line. Either side ending tears the
//! whole session down; there are no timeouts and no retries.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use idobata_shared::{protocol::decode_snapshot, room::RoomState};

use crate::{
    error::ClientError,
    input::spawn_input_thread,
    renderer::Screen,
};

/// Run one client session until the connection or the user ends it.
pub async fn run_session(url: &str, name: &str) -> Result<(), ClientError> {
    let (ws_stream, _response) = connect_async(url)
        .await
        .map_err(|e| ClientError::Connection(e.to_string()))?;
    tracing::info!("Connected to {}", url);

    let (mut write, mut read) = ws_stream.split();

    // First frame out is the raw name, no protocol wrapper.
    write
        .send(Message::Text(name.to_string().into()))
        .await
        .map_err(|e| ClientError::Connection(e.to_string()))?;

    // The pending typed line, shared so a redraw can re-echo it.
    let current_line = Arc::new(Mutex::new(String::new()));
    let shutdown = Arc::new(AtomicBool::new(false));

    let mut screen = Screen::new(name.to_string())?;
    screen.invalidate(&RoomState::empty())?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let _input_thread = spawn_input_thread(
        name.to_string(),
        current_line.clone(),
        shutdown.clone(),
        event_tx,
    );

    // Writer: events go out strictly in emission order, one at a time, so
    // a typing notification is on the wire before the body it narrates.
    let mut write_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let Err(e) = write.send(Message::Text(event.encode().into())).await {
                return Err(ClientError::Connection(e.to_string()));
            }
        }
        // input thread ended (Ctrl+C); nothing more to send
        Ok(())
    });

    // Sync loop: apply each snapshot, redraw, re-echo the pending line.
    let line_for_redraw = current_line.clone();
    let mut read_task = tokio::spawn(async move {
        use std::io::Write as _;

        loop {
            let Some(frame) = read.next().await else {
                break Ok(());
            };
            match frame {
                Ok(Message::Text(text)) => match decode_snapshot(&text) {
                    Ok(state) => {
                        screen.invalidate(&state)?;
                        let pending = match line_for_redraw.lock() {
                            Ok(guard) => guard.clone(),
                            Err(poisoned) => poisoned.into_inner().clone(),
                        };
                        print!("{pending}");
                        let _ = std::io::stdout().flush();
                    }
                    Err(e) => break Err(ClientError::Protocol(e)),
                },
                Ok(Message::Close(frame)) => {
                    tracing::info!("Server closed the connection: {:?}", frame);
                    break Ok(());
                }
                Ok(_) => {}
                Err(e) => break Err(ClientError::Connection(e.to_string())),
            }
        }
        // Screen drops with this task, restoring the terminal
    });

    // Either side ending ends the session; the input thread notices the
    // flag at its next poll tick.
    let result = tokio::select! {
        read_result = &mut read_task => {
            write_task.abort();
            read_result.unwrap_or(Ok(()))
        }
        write_result = &mut write_task => {
            read_task.abort();
            write_result.unwrap_or(Ok(()))
        }
    };
    shutdown.store(true, Ordering::Relaxed);

    result
}
