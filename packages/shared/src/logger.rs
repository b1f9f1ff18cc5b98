//! Logging setup shared by the server and client binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// The default can be overridden through the `RUST_LOG` environment
/// variable. The client binary passes a quiet default so log lines do not
/// land in the middle of its redrawn frame.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "server", "client")
/// * `default_level` - The default log level (e.g., "debug", "info", "error")
pub fn setup_logger(binary_name: &str, default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "idobata={level},idobata_shared={level},idobata_server={level},idobata_client={level},{bin}={level}",
                    level = default_level,
                    bin = binary_name,
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
