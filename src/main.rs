//! avogadro-load - ask a running Avogadro2 to display methane.
//!
//! Connects to the `"avogadro"` local socket, sends one `loadMolecule`
//! request, flushes, and exits. No reply is read.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use avogadro_rpc::ipc::{RpcConnection, DEFAULT_SERVER_NAME};
use avogadro_rpc::models::RpcMessage;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr; a successful run prints nothing at the default level.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut connection = RpcConnection::connect(DEFAULT_SERVER_NAME).await?;

    let message = RpcMessage::methane();
    connection.send_message(&message).await?;

    // Flush and close the write side so the frame leaves before we exit.
    connection.disconnect().await?;

    tracing::info!("Sent {} to {}", message.method, connection.server_name());
    Ok(())
}
