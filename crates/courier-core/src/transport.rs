//! Transport abstraction for accepting client streams.
//!
//! The relay speaks WebSocket over any reliable byte stream. Production uses
//! tokio's TCP listener, tests use turmoil (simulated TCP) so keepalive
//! behaviour can be exercised in virtual time.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Source of inbound byte streams.
///
/// Each accepted stream is one client connection; the WebSocket upgrade runs
/// on top of it.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Duplex byte stream to one peer.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Accept the next incoming stream.
    ///
    /// Blocks until a peer connects and returns the stream with the peer's
    /// address.
    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)>;

    /// Address this listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Listener for tokio::net::TcpListener {
    type Stream = tokio::net::TcpStream;

    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)> {
        let (stream, peer) = tokio::net::TcpListener::accept(self).await?;
        // Small JSON frames; don't wait to fill a segment
        stream.set_nodelay(true)?;
        Ok((stream, peer))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        tokio::net::TcpListener::local_addr(self)
    }
}
