//! Client execution logic.

use idobata_shared::protocol::sanitize_name;

use crate::{error::ClientError, session::run_session};

/// Run the chat client for one session.
///
/// All failures are terminal to the session; nothing is retried.
pub async fn run_client(url: String, name: String) -> Result<(), ClientError> {
    let name = sanitize_name(&name);
    if name.is_empty() {
        return Err(ClientError::InvalidName);
    }

    tracing::info!("Connecting to {} as '{}'", url, name);
    run_session(&url, &name).await?;

    println!("Client finished.");
    Ok(())
}
