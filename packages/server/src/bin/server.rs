//! WebSocket chat server with full-state broadcast.
//!
//! Accepts persistent connections, maintains the shared room state, and
//! pushes the complete snapshot to every participant after each change.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin server
//! cargo run --bin server -- --host 0.0.0.0 --port 3000
//! ```

use clap::Parser;

use idobata_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "WebSocket chat server with room state broadcast", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "5000")]
    port: u16,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    if let Err(e) = idobata_server::run_server(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
