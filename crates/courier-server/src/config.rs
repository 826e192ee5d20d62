//! Command-line and environment configuration.

use std::{net::SocketAddr, time::Duration};

use clap::Parser;
use courier_core::ConnectionConfig;

use crate::error::ServerError;

/// Courier relay server
#[derive(Debug, Clone, Parser)]
#[command(name = "courier-server", version, about)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "COURIER_ADDR", default_value = "0.0.0.0:8088")]
    pub addr: String,

    /// Port override, for platforms that hand the port out via `PORT`
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// HTTP path clients upgrade on
    #[arg(long, env = "COURIER_PATH", default_value = "/ws")]
    pub path: String,

    /// Seconds without any frame from a peer before it is dropped
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub pong_wait_secs: u64,

    /// Seconds allowed for a single write
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub write_wait_secs: u64,

    /// Largest inbound message, in bytes
    #[arg(long, default_value_t = 2048)]
    pub max_message_size: usize,

    /// Frames buffered per connection before it is dropped
    #[arg(long, default_value_t = 256)]
    pub queue_capacity: usize,

    /// Commands buffered for the hub before readers wait
    #[arg(long, default_value_t = 1024)]
    pub hub_capacity: usize,
}

impl ServerConfig {
    /// Socket address to bind, with `port` applied.
    pub fn listen_addr(&self) -> Result<SocketAddr, ServerError> {
        let mut addr: SocketAddr = self
            .addr
            .parse()
            .map_err(|source| ServerError::InvalidAddress { addr: self.addr.clone(), source })?;
        if let Some(port) = self.port {
            addr.set_port(port);
        }
        Ok(addr)
    }

    /// Per-connection timing and limits.
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            write_wait: Duration::from_secs(self.write_wait_secs),
            max_message_size: self.max_message_size,
            queue_capacity: self.queue_capacity,
            ..ConnectionConfig::with_pong_wait(Duration::from_secs(self.pong_wait_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_connection_defaults() {
        let config = ServerConfig::try_parse_from(["courier-server"]).unwrap();
        assert_eq!(config.connection(), ConnectionConfig::default());
        assert_eq!(config.path, "/ws");
        assert_eq!(config.hub_capacity, 1024);
    }

    #[test]
    fn port_overrides_addr_port() {
        let config =
            ServerConfig::try_parse_from(["courier-server", "--addr", "127.0.0.1:1", "--port", "9000"])
                .unwrap();
        assert_eq!(config.listen_addr().unwrap(), "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn bad_addr_is_reported() {
        let config = ServerConfig::try_parse_from(["courier-server", "--addr", "nowhere"]).unwrap();
        assert!(matches!(config.listen_addr(), Err(ServerError::InvalidAddress { .. })));
    }

    #[test]
    fn zero_pong_wait_is_rejected() {
        assert!(ServerConfig::try_parse_from(["courier-server", "--pong-wait-secs", "0"]).is_err());
    }

    #[test]
    fn custom_timings() {
        let config = ServerConfig::try_parse_from([
            "courier-server",
            "--pong-wait-secs",
            "20",
            "--write-wait-secs",
            "2",
        ])
        .unwrap();
        let connection = config.connection();
        assert_eq!(connection.pong_wait, Duration::from_secs(20));
        assert_eq!(connection.ping_period, Duration::from_secs(18));
        assert_eq!(connection.write_wait, Duration::from_secs(2));
    }
}
