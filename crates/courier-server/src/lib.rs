//! Courier relay server
//!
//! Tokio runtime for the relay: a hub actor owning the
//! [`courier_core::Hub`] state machine, two pumps per WebSocket connection,
//! and an accept loop generic over [`courier_core::Listener`] so the same
//! server runs on real TCP and in turmoil simulations.
//!
//! # Components
//!
//! - [`hub`]: Hub actor and its cloneable handle
//! - [`connection`]: Inbound and outbound pumps
//! - [`server`]: Accept loop and WebSocket upgrade
//! - [`config`]: CLI / environment configuration
//! - [`error`]: Server error types

pub mod config;
pub mod connection;
pub mod error;
pub mod hub;
pub mod server;

pub use config::ServerConfig;
pub use error::ServerError;
pub use hub::HubHandle;
pub use server::Server;
