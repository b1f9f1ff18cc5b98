//! Server execution logic.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use super::{
    handler::{debug_room_state, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Build the application router.
///
/// Exposed separately from [`run_server`] so integration tests can serve
/// the app on an ephemeral listener.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/health", get(health_check))
        .route("/debug/room", get(debug_room_state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the WebSocket chat server
///
/// # Arguments
///
/// * `host` - The host address to bind to (e.g., "127.0.0.1")
/// * `port` - The port number to bind to (e.g., 8080)
pub async fn run_server(host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(Arc::new(AppState::new()));

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!(
        "WebSocket chat server listening on {}",
        listener.local_addr()?
    );
    tracing::info!("Connect to: ws://{}/ws", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown gracefully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
