//! Accept loop and WebSocket upgrade.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use courier_core::{ConnectionConfig, ConnectionId, Listener};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async_with_config,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        protocol::WebSocketConfig,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{connection, error::ServerError, hub::HubHandle};

/// Pause after a failed accept before trying again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Relay server: accepts streams, upgrades them and hands them to the hub.
#[derive(Debug)]
pub struct Server {
    path: Arc<str>,
    connection: ConnectionConfig,
    hub: HubHandle,
    next_id: AtomicU64,
}

impl Server {
    /// Create a server upgrading on `path` and registering with `hub`.
    pub fn new(path: impl Into<Arc<str>>, connection: ConnectionConfig, hub: HubHandle) -> Self {
        Self { path: path.into(), connection, hub, next_id: AtomicU64::new(1) }
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// Each stream is upgraded on its own task, so a slow handshake never
    /// holds up the loop.
    pub async fn run<L: Listener>(&self, listener: L, shutdown: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, path = %self.path, "accepting connections");
        }

        loop {
            let (stream, peer) = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        // Persistent failures (fd exhaustion) would otherwise spin
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    },
                },
            };

            let conn = self.next_id.fetch_add(1, Ordering::Relaxed);
            let path = Arc::clone(&self.path);
            let hub = self.hub.clone();
            let config = self.connection;

            tokio::spawn(async move {
                match accept_connection(stream, conn, &path, config, hub).await {
                    Ok(()) => debug!(conn, %peer, "connection established"),
                    Err(err) => debug!(conn, %peer, error = %err, "connection not established"),
                }
            });
        }

        info!("accept loop stopped");
    }
}

/// Upgrade one stream and start its pumps.
pub async fn accept_connection<S>(
    stream: S,
    conn: ConnectionId,
    path: &str,
    config: ConnectionConfig,
    hub: HubHandle,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws = upgrade(stream, path, config.max_message_size).await?;
    connection::spawn(conn, ws, hub, config).await
}

/// Perform the WebSocket handshake, accepting only requests for `path`.
///
/// Any origin is accepted. Requests for other paths get a 404.
pub async fn upgrade<S>(
    stream: S,
    path: &str,
    max_message_size: usize,
) -> Result<WebSocketStream<S>, ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(max_message_size);
    ws_config.max_frame_size = Some(max_message_size);

    let expected = path.to_owned();
    let check_path = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if request.uri().path() == expected {
            return Ok(response);
        }
        let mut rejection = ErrorResponse::new(Some(format!("no websocket endpoint at {}", request.uri().path())));
        *rejection.status_mut() = StatusCode::NOT_FOUND;
        Err(rejection)
    };

    Ok(accept_hdr_async_with_config(stream, check_path, Some(ws_config)).await?)
}

#[cfg(test)]
mod tests {
    use std::{io, net::SocketAddr, sync::atomic::AtomicUsize};

    use async_trait::async_trait;
    use tokio::io::DuplexStream;

    use super::*;
    use crate::hub;

    /// Listener whose every accept fails, as under fd exhaustion.
    struct ExhaustedListener {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Listener for ExhaustedListener {
        type Stream = DuplexStream;

        async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            Err(io::Error::other("too many open files"))
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
        }
    }

    #[tokio::test]
    async fn failing_accepts_back_off() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let listener = ExhaustedListener { attempts: Arc::clone(&attempts) };
        let (hub, _task) = hub::spawn(4);
        let server = Server::new("/ws", ConnectionConfig::default(), hub);

        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            stop.cancel();
        });
        server.run(listener, shutdown).await;

        // One attempt per backoff period, not a busy loop
        let attempts = attempts.load(Ordering::Relaxed);
        assert!((1..=6).contains(&attempts), "{attempts} accept attempts in 350ms");
    }
}
