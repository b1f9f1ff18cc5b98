//! Terminal chat client.
//!
//! Connects to an Idobata chat server, captures keystrokes without
//! blocking snapshot reception, and redraws the room view after every
//! state push. Typing is signalled live to the other participants.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin client -- --name alice
//! cargo run --bin client -- -n bob -u ws://example.org:5000/ws
//! ```

use clap::Parser;

use idobata_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "client")]
#[command(about = "Terminal chat client with live typing indicators", long_about = None)]
struct Args {
    /// Display name (must be unique in the room, 32 bytes max)
    #[arg(short = 'n', long)]
    name: String,

    /// WebSocket server URL
    #[arg(short = 'u', long, default_value = "ws://127.0.0.1:5000/ws")]
    url: String,
}

#[tokio::main]
async fn main() {
    // Quiet by default: log lines would land inside the redrawn frame
    setup_logger(env!("CARGO_BIN_NAME"), "error");

    let args = Args::parse();

    if let Err(e) = idobata_client::run_client(args.url, args.name).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
