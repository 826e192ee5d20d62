//! Hub actor.
//!
//! One task owns the [`Hub`] state machine together with the sending half of
//! every connection's outbound queue. Everything else talks to it through a
//! [`HubHandle`]. Commands arrive on a single ordered channel, so a
//! connection's registration is always processed before its first message,
//! and messages from one sender are handled in the order they were read.
//!
//! The actor never awaits anything but its own command channel: deliveries
//! use `try_send`, and a full or closed queue force-drops the recipient
//! instead of stalling the loop.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use courier_core::{ConnectionId, Hub, HubAction, HubSnapshot, RemovalReason};
use courier_proto::InboundMessage;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
};
use tracing::{debug, info, trace, warn};

use crate::error::ServerError;

/// Sending half of a connection's outbound queue.
pub type OutboundQueue = mpsc::Sender<Bytes>;

/// Requests handled by the hub actor.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a connection (unbound) together with its outbound queue
    Register {
        /// New connection
        conn: ConnectionId,
        /// Queue drained by its outbound pump
        queue: OutboundQueue,
    },
    /// Remove a connection; no-op if already gone
    Unregister {
        /// Connection leaving
        conn: ConnectionId,
    },
    /// Bind or route a decoded message
    Inbound {
        /// Connection the message was read from
        conn: ConnectionId,
        /// Decoded message
        message: InboundMessage,
    },
    /// Fan a pre-encoded frame out to every connection
    Broadcast {
        /// Encoded frame
        frame: Bytes,
    },
    /// Report the registry contents
    Snapshot {
        /// Reply channel
        reply: oneshot::Sender<HubSnapshot>,
    },
    /// Close every queue and stop the actor
    Shutdown,
}

/// Cloneable handle to the hub actor.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Register a connection with its outbound queue.
    pub async fn register(
        &self,
        conn: ConnectionId,
        queue: OutboundQueue,
    ) -> Result<(), ServerError> {
        self.send(HubCommand::Register { conn, queue }).await
    }

    /// Ask the hub to remove a connection.
    pub async fn unregister(&self, conn: ConnectionId) -> Result<(), ServerError> {
        self.send(HubCommand::Unregister { conn }).await
    }

    /// Hand a decoded message to the hub.
    pub async fn inbound(
        &self,
        conn: ConnectionId,
        message: InboundMessage,
    ) -> Result<(), ServerError> {
        self.send(HubCommand::Inbound { conn, message }).await
    }

    /// Send a frame to every registered connection.
    ///
    /// Connections whose queue is full are dropped rather than waited on.
    pub async fn broadcast(&self, frame: Bytes) -> Result<(), ServerError> {
        self.send(HubCommand::Broadcast { frame }).await
    }

    /// Current registry contents.
    pub async fn snapshot(&self) -> Result<HubSnapshot, ServerError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| ServerError::HubClosed)
    }

    /// Close every connection and stop the actor.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        self.send(HubCommand::Shutdown).await
    }

    async fn send(&self, command: HubCommand) -> Result<(), ServerError> {
        self.commands.send(command).await.map_err(|_| ServerError::HubClosed)
    }
}

/// Spawn the hub actor on the current runtime.
///
/// `capacity` bounds the command channel; callers wait when it is full.
pub fn spawn(capacity: usize) -> (HubHandle, JoinHandle<()>) {
    let (commands, rx) = mpsc::channel(capacity.max(1));
    let actor = HubActor { hub: Hub::new(), queues: HashMap::new(), commands: rx };
    (HubHandle { commands }, tokio::spawn(actor.run()))
}

struct HubActor {
    hub: Hub,
    queues: HashMap<ConnectionId, OutboundQueue>,
    commands: mpsc::Receiver<HubCommand>,
}

impl HubActor {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                HubCommand::Register { conn, queue } => {
                    if self.hub.register(conn) {
                        self.queues.insert(conn, queue);
                        debug!(conn, "connection registered");
                    }
                },
                HubCommand::Unregister { conn } => {
                    let actions = self.hub.unregister(conn);
                    self.execute(actions);
                },
                HubCommand::Inbound { conn, message } => {
                    if let Some(bound) = self.hub.identity_of(conn)
                        && bound != message.sender_key()
                    {
                        debug!(conn, %bound, claimed = %message.sender_key(), "ignoring claimed sender");
                    }
                    match self.hub.handle_inbound(conn, &message) {
                        Ok(actions) => self.execute(actions),
                        Err(err) => warn!(conn, error = %err, "dropping message"),
                    }
                },
                HubCommand::Broadcast { frame } => {
                    let actions = self.hub.broadcast(&frame);
                    self.execute(actions);
                },
                HubCommand::Snapshot { reply } => {
                    // Requester may have given up
                    let _ = reply.send(self.hub.snapshot());
                },
                HubCommand::Shutdown => {
                    let actions = self.hub.shutdown();
                    info!(connections = actions.len(), "hub shutting down");
                    self.execute(actions);
                    break;
                },
            }
        }
        debug!("hub stopped");
    }

    fn execute(&mut self, actions: Vec<HubAction>) {
        let mut pending: VecDeque<HubAction> = actions.into();

        while let Some(action) = pending.pop_front() {
            match action {
                HubAction::Deliver { to, frame } => {
                    let Some(queue) = self.queues.get(&to) else {
                        continue;
                    };
                    match queue.try_send(frame) {
                        Ok(()) => trace!(conn = to, "frame queued"),
                        Err(TrySendError::Full(_)) => {
                            warn!(conn = to, "outbound queue full, dropping connection");
                            pending.extend(self.hub.force_drop(to));
                        },
                        Err(TrySendError::Closed(_)) => {
                            debug!(conn = to, "outbound pump gone, dropping connection");
                            pending.extend(self.hub.force_drop(to));
                        },
                    }
                },
                HubAction::Removed { conn, identity, reason } => {
                    // Dropping the only sender closes the queue
                    self.queues.remove(&conn);
                    match (identity, reason) {
                        (Some(identity), RemovalReason::Unregistered) => {
                            info!(conn, %identity, "identity released");
                        },
                        (None, RemovalReason::Unregistered) => {
                            debug!(conn, "unbound connection removed");
                        },
                        (identity, RemovalReason::ForceDropped) => {
                            warn!(conn, identity = ?identity, "connection force-dropped");
                        },
                        (_, RemovalReason::Shutdown) => {},
                    }
                },
                HubAction::Bound { conn, identity } => {
                    info!(conn, %identity, "identity bound");
                },
                HubAction::BindRejected { conn, identity, holder } => {
                    warn!(conn, %identity, holder, "identity already bound, rejecting");
                },
                HubAction::Unroutable { from, target } => {
                    trace!(%from, %target, "no connection for target, message dropped");
                },
            }
        }
    }
}
