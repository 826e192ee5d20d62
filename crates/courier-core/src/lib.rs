//! Courier relay core logic
//!
//! Pure state machine logic for the relay, decoupled from I/O so the same
//! code runs in the production server, unit tests and the turmoil
//! simulation.
//!
//! # Architecture
//!
//! The [`Hub`] owns the registry of live connections and the identity lookup
//! table. It never touches a socket or a queue: every operation returns
//! declarative [`HubAction`]s (deliver this frame, close that queue) and the
//! runtime executes them. Delivery failures found while executing are fed
//! back into the hub as force-drops, so both tables are always updated by the
//! same code path.
//!
//! Time is passed in explicitly. [`Liveness`] tracks the read deadline of one
//! connection given the instants the caller observed frames at.
//!
//! # Components
//!
//! - [`hub`]: Registry, identity binding and routing
//! - [`connection`]: Per-connection timing configuration and liveness
//! - [`transport`]: Listener abstraction (tokio TCP, turmoil TCP)
//! - [`error`]: Hub error types

pub mod connection;
pub mod error;
pub mod hub;
pub mod transport;

pub use connection::{ConnectionConfig, Liveness};
pub use error::HubError;
pub use hub::{ConnectionId, Hub, HubAction, HubSnapshot, RemovalReason};
pub use transport::Listener;
