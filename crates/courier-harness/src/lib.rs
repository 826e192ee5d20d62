//! Deterministic simulation harness for the Courier relay.
//!
//! Turmoil-backed listener, server and WebSocket client so keepalive and
//! routing behaviour can be tested in virtual time over a simulated network.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod sim_client;
pub mod sim_listener;
pub mod sim_server;

pub use sim_client::SimClient;
pub use sim_listener::SimListener;
pub use sim_server::{SERVER_PORT, WS_PATH, serve};

/// Result type turmoil hosts and clients return.
pub type SimResult<T = ()> = Result<T, Box<dyn std::error::Error>>;
