//! Server error types.

use std::io;

use thiserror::Error;

/// Errors surfaced by the server runtime.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listen address could not be parsed
    #[error("invalid listen address {addr:?}: {source}")]
    InvalidAddress {
        /// Address as given
        addr: String,
        /// Parse failure
        source: std::net::AddrParseError,
    },

    /// Binding the listener failed
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind
        addr: std::net::SocketAddr,
        /// Underlying I/O error
        source: io::Error,
    },

    /// WebSocket upgrade failed
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),

    /// The hub actor has stopped
    #[error("hub is no longer running")]
    HubClosed,
}
