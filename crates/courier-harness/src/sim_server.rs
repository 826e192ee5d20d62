//! Relay server running inside a turmoil host.

use std::net::{Ipv4Addr, SocketAddr};

use courier_core::ConnectionConfig;
use courier_server::{Server, hub};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{SimListener, SimResult};

/// Port the simulated server listens on.
pub const SERVER_PORT: u16 = 8088;

/// Upgrade path of the simulated server.
pub const WS_PATH: &str = "/ws";

/// Run a relay on the current host until the simulation ends.
///
/// Use as the body of `sim.host(..)`.
pub async fn serve(config: ConnectionConfig) -> SimResult {
    let listener = SimListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, SERVER_PORT))).await?;
    let (hub, _task) = hub::spawn(64);
    info!(?config, "simulated relay starting");

    let server = Server::new(WS_PATH, config, hub);
    server.run(listener, CancellationToken::new()).await;
    Ok(())
}
