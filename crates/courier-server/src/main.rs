//! Courier relay server binary.

use clap::Parser;
use courier_server::{Server, ServerConfig, ServerError, hub};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::parse();
    let addr = config.listen_addr()?;
    let listener =
        TcpListener::bind(addr).await.map_err(|source| ServerError::Bind { addr, source })?;

    let (hub, hub_task) = hub::spawn(config.hub_capacity);
    let server = Server::new(config.path.as_str(), config.connection(), hub.clone());

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, shutting down");
                signal.cancel();
            },
            Err(err) => warn!(error = %err, "cannot listen for interrupt"),
        }
    });

    server.run(listener, shutdown).await;

    hub.shutdown().await?;
    if let Err(err) = hub_task.await {
        warn!(error = %err, "hub task failed");
    }
    Ok(())
}
