//! Listener over turmoil's simulated TCP.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use courier_core::Listener;

/// Simulated TCP listener for the relay's accept loop.
pub struct SimListener {
    inner: turmoil::net::TcpListener,
}

impl SimListener {
    /// Bind on the current simulated host.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let inner = turmoil::net::TcpListener::bind(addr).await?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl Listener for SimListener {
    type Stream = turmoil::net::TcpStream;

    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)> {
        self.inner.accept().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
