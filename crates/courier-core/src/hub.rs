//! Hub registry and routing state machine.
//!
//! The hub is the single authority over which connections are live and which
//! identity each one holds. It is driven by exactly one task, so none of its
//! state needs locking.
//!
//! # Architecture: Action-Based State Machine
//!
//! - Methods mutate the registry and return `Vec<HubAction>`
//! - The driver executes actions (enqueue a frame, close a queue, log)
//! - A failed non-blocking enqueue is reported back via [`Hub::force_drop`]
//!
//! # Binding and routing
//!
//! ```text
//!                  first message,           later messages
//!  ┌──────────┐    key free        ┌───────┐  route to (realm, target)
//!  │ Unbound  │───────────────────>│ Bound │──────────────────────┐
//!  └──────────┘                    └───────┘<─────────────────────┘
//!     │    ^
//!     │    │ key held elsewhere: BindRejected, stay unbound
//!     └────┘
//! ```
//!
//! A bound connection's identity never changes. Every removal path
//! (unregister, force-drop, shutdown) clears both the registry entry and the
//! identity entry in the same step, and yields exactly one
//! [`HubAction::Removed`] per connection, which is the driver's cue to close
//! that connection's outbound queue.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use courier_proto::{IdentityKey, InboundMessage, OutboundMessage};

use crate::error::HubError;

/// Server-assigned connection handle.
pub type ConnectionId = u64;

/// Why a connection left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The connection's own pumps asked to leave (close, error, timeout)
    Unregistered,
    /// The outbound queue was full or gone when the hub tried to deliver
    ForceDropped,
    /// The hub is shutting down
    Shutdown,
}

/// Actions returned by the hub.
///
/// The driver (hub actor or test) executes these:
/// - `Deliver`: non-blocking enqueue on the target's outbound queue
/// - `Removed`: close the connection's outbound queue
/// - the rest are outcomes to log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubAction {
    /// Enqueue this frame on a connection's outbound queue without blocking
    Deliver {
        /// Recipient connection
        to: ConnectionId,
        /// Encoded frame
        frame: Bytes,
    },

    /// Connection left the registry; its outbound queue must be closed
    Removed {
        /// Connection removed
        conn: ConnectionId,
        /// Identity it held, now free for others
        identity: Option<IdentityKey>,
        /// Why it was removed
        reason: RemovalReason,
    },

    /// Connection bound to an identity
    Bound {
        /// Connection bound
        conn: ConnectionId,
        /// Identity it now holds
        identity: IdentityKey,
    },

    /// Binding attempt lost to a connection already holding the key
    BindRejected {
        /// Connection that attempted to bind
        conn: ConnectionId,
        /// Identity it asked for
        identity: IdentityKey,
        /// Connection currently holding the identity
        holder: ConnectionId,
    },

    /// No live connection holds the target identity; message dropped
    Unroutable {
        /// Sender identity
        from: IdentityKey,
        /// Target identity
        target: IdentityKey,
    },
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubSnapshot {
    /// Number of registered connections, bound or not
    pub connections: usize,
    /// Bound identities and their holders
    pub bound: BTreeMap<IdentityKey, ConnectionId>,
}

impl HubSnapshot {
    /// Connection holding `identity`, if any.
    pub fn holder(&self, identity: IdentityKey) -> Option<ConnectionId> {
        self.bound.get(&identity).copied()
    }

    /// Number of registered connections without an identity.
    pub fn unbound(&self) -> usize {
        self.connections - self.bound.len()
    }
}

/// Registry of live connections and identity lookup table.
#[derive(Debug, Default)]
pub struct Hub {
    /// Every live connection and the identity it holds, if bound
    connections: BTreeMap<ConnectionId, Option<IdentityKey>>,
    /// Identity -> holder
    by_identity: HashMap<IdentityKey, ConnectionId>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of bound identities.
    pub fn bound_count(&self) -> usize {
        self.by_identity.len()
    }

    /// Whether `conn` is registered.
    pub fn is_registered(&self, conn: ConnectionId) -> bool {
        self.connections.contains_key(&conn)
    }

    /// Identity held by `conn`.
    pub fn identity_of(&self, conn: ConnectionId) -> Option<IdentityKey> {
        self.connections.get(&conn).copied().flatten()
    }

    /// Connection holding `identity`.
    pub fn holder_of(&self, identity: IdentityKey) -> Option<ConnectionId> {
        self.by_identity.get(&identity).copied()
    }

    /// Copy the registry for diagnostics.
    pub fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            connections: self.connections.len(),
            bound: self.by_identity.iter().map(|(&k, &c)| (k, c)).collect(),
        }
    }

    /// Register a new, unbound connection.
    ///
    /// Returns `false` if `conn` was already registered (no change).
    pub fn register(&mut self, conn: ConnectionId) -> bool {
        if self.connections.contains_key(&conn) {
            return false;
        }
        self.connections.insert(conn, None);
        true
    }

    /// Remove a connection at its own request.
    ///
    /// Idempotent: unregistering an absent connection returns no actions.
    pub fn unregister(&mut self, conn: ConnectionId) -> Vec<HubAction> {
        self.remove(conn, RemovalReason::Unregistered)
    }

    /// Remove a connection whose outbound queue could not take a frame.
    pub fn force_drop(&mut self, conn: ConnectionId) -> Vec<HubAction> {
        self.remove(conn, RemovalReason::ForceDropped)
    }

    /// Remove every connection.
    pub fn shutdown(&mut self) -> Vec<HubAction> {
        let conns: Vec<ConnectionId> = self.connections.keys().copied().collect();
        conns.into_iter().flat_map(|conn| self.remove(conn, RemovalReason::Shutdown)).collect()
    }

    /// Fan a frame out to every registered connection.
    pub fn broadcast(&self, frame: &Bytes) -> Vec<HubAction> {
        self.connections
            .keys()
            .map(|&to| HubAction::Deliver { to, frame: frame.clone() })
            .collect()
    }

    /// Handle a decoded message from `conn`.
    ///
    /// An unbound connection's message is a binding attempt for the claimed
    /// sender key. A bound connection's message is a send from its bound
    /// identity to `(bound realm, target_id)`; the claimed sender fields are
    /// not consulted again.
    ///
    /// Messages from connections that are no longer registered (for example
    /// after a force-drop, before the pumps have noticed) are ignored.
    ///
    /// # Errors
    /// Returns `Encode` if the outbound frame cannot be built
    pub fn handle_inbound(
        &mut self,
        conn: ConnectionId,
        message: &InboundMessage,
    ) -> Result<Vec<HubAction>, HubError> {
        let Some(slot) = self.connections.get(&conn).copied() else {
            return Ok(vec![]);
        };

        match slot {
            None => Ok(vec![self.bind(conn, message.sender_key())]),
            Some(identity) => self.route(identity, message),
        }
    }

    /// Check invariants: every bound slot is mirrored in the lookup table
    /// and vice versa.
    pub fn is_consistent(&self) -> bool {
        let forward = self.connections.iter().all(|(conn, slot)| match slot {
            Some(identity) => self.by_identity.get(identity) == Some(conn),
            None => true,
        });
        let backward = self
            .by_identity
            .iter()
            .all(|(identity, conn)| self.connections.get(conn) == Some(&Some(*identity)));
        forward && backward
    }

    fn bind(&mut self, conn: ConnectionId, identity: IdentityKey) -> HubAction {
        if let Some(&holder) = self.by_identity.get(&identity) {
            return HubAction::BindRejected { conn, identity, holder };
        }

        self.by_identity.insert(identity, conn);
        self.connections.insert(conn, Some(identity));
        HubAction::Bound { conn, identity }
    }

    fn route(
        &self,
        from: IdentityKey,
        message: &InboundMessage,
    ) -> Result<Vec<HubAction>, HubError> {
        let target = from.peer(message.target_id);
        let Some(&to) = self.by_identity.get(&target) else {
            return Ok(vec![HubAction::Unroutable { from, target }]);
        };

        let frame = OutboundMessage {
            kind: message.kind,
            sender_id: from.id,
            body: message.body.clone(),
        }
        .encode()?;

        Ok(vec![HubAction::Deliver { to, frame }])
    }

    fn remove(&mut self, conn: ConnectionId, reason: RemovalReason) -> Vec<HubAction> {
        let Some(identity) = self.connections.remove(&conn) else {
            return vec![];
        };

        if let Some(key) = identity {
            // Only clear the entry if it still points at us
            if self.by_identity.get(&key) == Some(&conn) {
                self.by_identity.remove(&key);
            }
        }

        vec![HubAction::Removed { conn, identity, reason }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(realm: i64, from: i64, to: i64, body: &str) -> InboundMessage {
        InboundMessage {
            kind: 0,
            sender_realm: realm,
            target_id: to,
            sender_id: from,
            body: body.to_string(),
        }
    }

    fn bind(hub: &mut Hub, conn: ConnectionId, realm: i64, id: i64) {
        hub.register(conn);
        let actions = hub.handle_inbound(conn, &msg(realm, id, 0, "")).unwrap();
        assert_eq!(actions, vec![HubAction::Bound { conn, identity: IdentityKey::new(realm, id) }]);
    }

    fn delivered(actions: &[HubAction]) -> Vec<(ConnectionId, OutboundMessage)> {
        actions
            .iter()
            .filter_map(|a| match a {
                HubAction::Deliver { to, frame } => {
                    Some((*to, OutboundMessage::decode(frame).unwrap()))
                },
                _ => None,
            })
            .collect()
    }

    #[test]
    fn new_hub_is_empty() {
        let hub = Hub::new();
        assert!(hub.is_empty());
        assert_eq!(hub.bound_count(), 0);
        assert!(hub.is_consistent());
    }

    #[test]
    fn register_is_unbound_and_once_only() {
        let mut hub = Hub::new();
        assert!(hub.register(1));
        assert!(!hub.register(1));

        assert_eq!(hub.len(), 1);
        assert!(hub.is_registered(1));
        assert_eq!(hub.identity_of(1), None);
    }

    #[test]
    fn first_message_binds_without_forwarding() {
        let mut hub = Hub::new();
        hub.register(1);

        let actions = hub.handle_inbound(1, &msg(1, 10, 20, "ignored")).unwrap();

        assert_eq!(actions, vec![HubAction::Bound { conn: 1, identity: IdentityKey::new(1, 10) }]);
        assert_eq!(hub.identity_of(1), Some(IdentityKey::new(1, 10)));
        assert_eq!(hub.holder_of(IdentityKey::new(1, 10)), Some(1));
    }

    #[test]
    fn routes_to_bound_target_with_sender_id() {
        let mut hub = Hub::new();
        bind(&mut hub, 1, 1, 10);
        bind(&mut hub, 2, 1, 20);

        let actions = hub.handle_inbound(1, &msg(1, 10, 20, "hello")).unwrap();

        assert_eq!(
            delivered(&actions),
            vec![(2, OutboundMessage { kind: 0, sender_id: 10, body: "hello".to_string() })]
        );
    }

    #[test]
    fn unbound_target_is_dropped() {
        let mut hub = Hub::new();
        bind(&mut hub, 1, 1, 10);
        bind(&mut hub, 2, 1, 20);

        let actions = hub.handle_inbound(1, &msg(1, 10, 99, "lost")).unwrap();

        assert_eq!(
            actions,
            vec![HubAction::Unroutable {
                from: IdentityKey::new(1, 10),
                target: IdentityKey::new(1, 99)
            }]
        );
    }

    #[test]
    fn routing_stays_within_realm() {
        let mut hub = Hub::new();
        bind(&mut hub, 1, 1, 10);
        bind(&mut hub, 2, 0, 20);

        let actions = hub.handle_inbound(1, &msg(1, 10, 20, "x")).unwrap();
        assert!(matches!(actions[..], [HubAction::Unroutable { .. }]));
    }

    #[test]
    fn replayed_sender_key_is_a_send_not_a_rebind() {
        let mut hub = Hub::new();
        bind(&mut hub, 1, 1, 10);

        // Target is self: delivered back to the same connection
        for _ in 0..3 {
            let actions = hub.handle_inbound(1, &msg(1, 10, 10, "echo")).unwrap();
            assert_eq!(delivered(&actions).len(), 1);
        }
        assert_eq!(hub.bound_count(), 1);
        assert_eq!(hub.identity_of(1), Some(IdentityKey::new(1, 10)));
    }

    #[test]
    fn bound_identity_ignores_claimed_sender() {
        let mut hub = Hub::new();
        bind(&mut hub, 1, 1, 10);
        bind(&mut hub, 2, 1, 20);

        // Connection 1 claims to be 1:77; it is still routed as 1:10
        let actions = hub.handle_inbound(1, &msg(1, 77, 20, "hi")).unwrap();

        assert_eq!(delivered(&actions)[0].1.sender_id, 10);
        assert_eq!(hub.holder_of(IdentityKey::new(1, 77)), None);
        assert_eq!(hub.identity_of(1), Some(IdentityKey::new(1, 10)));
    }

    #[test]
    fn duplicate_binding_is_rejected() {
        let mut hub = Hub::new();
        bind(&mut hub, 1, 1, 10);
        hub.register(2);

        let actions = hub.handle_inbound(2, &msg(1, 10, 20, "hi")).unwrap();

        assert_eq!(
            actions,
            vec![HubAction::BindRejected { conn: 2, identity: IdentityKey::new(1, 10), holder: 1 }]
        );
        assert_eq!(hub.identity_of(2), None);
        assert_eq!(hub.holder_of(IdentityKey::new(1, 10)), Some(1));
        assert!(hub.is_consistent());
    }

    #[test]
    fn rejected_connection_can_bind_after_holder_leaves() {
        let mut hub = Hub::new();
        bind(&mut hub, 1, 1, 10);
        hub.register(2);
        hub.handle_inbound(2, &msg(1, 10, 0, "")).unwrap();

        hub.unregister(1);
        let actions = hub.handle_inbound(2, &msg(1, 10, 0, "")).unwrap();

        assert_eq!(actions, vec![HubAction::Bound { conn: 2, identity: IdentityKey::new(1, 10) }]);
    }

    #[test]
    fn unregister_frees_identity() {
        let mut hub = Hub::new();
        bind(&mut hub, 1, 1, 10);

        let actions = hub.unregister(1);

        assert_eq!(
            actions,
            vec![HubAction::Removed {
                conn: 1,
                identity: Some(IdentityKey::new(1, 10)),
                reason: RemovalReason::Unregistered
            }]
        );
        assert!(hub.is_empty());
        assert_eq!(hub.holder_of(IdentityKey::new(1, 10)), None);

        // A new connection can now take the key
        bind(&mut hub, 2, 1, 10);
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut hub = Hub::new();
        hub.register(1);

        assert_eq!(hub.unregister(1).len(), 1);
        assert!(hub.unregister(1).is_empty());
        assert!(hub.unregister(42).is_empty());
    }

    #[test]
    fn force_drop_clears_both_tables() {
        let mut hub = Hub::new();
        bind(&mut hub, 1, 1, 10);

        let actions = hub.force_drop(1);

        assert!(matches!(
            actions[..],
            [HubAction::Removed { conn: 1, reason: RemovalReason::ForceDropped, .. }]
        ));
        assert_eq!(hub.holder_of(IdentityKey::new(1, 10)), None);
        assert!(hub.is_consistent());
    }

    #[test]
    fn messages_after_removal_are_ignored() {
        let mut hub = Hub::new();
        bind(&mut hub, 1, 1, 10);
        hub.force_drop(1);

        let actions = hub.handle_inbound(1, &msg(1, 10, 10, "late")).unwrap();
        assert!(actions.is_empty());
        assert!(hub.is_empty());
    }

    #[test]
    fn broadcast_reaches_bound_and_unbound() {
        let mut hub = Hub::new();
        bind(&mut hub, 1, 1, 10);
        hub.register(2);

        let frame = Bytes::from_static(b"{\"type\":9,\"from\":0,\"msg\":\"all\"}");
        let actions = hub.broadcast(&frame);

        assert_eq!(
            actions,
            vec![
                HubAction::Deliver { to: 1, frame: frame.clone() },
                HubAction::Deliver { to: 2, frame },
            ]
        );
    }

    #[test]
    fn shutdown_removes_everyone() {
        let mut hub = Hub::new();
        bind(&mut hub, 1, 1, 10);
        hub.register(2);

        let actions = hub.shutdown();

        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|a| matches!(
            a,
            HubAction::Removed { reason: RemovalReason::Shutdown, .. }
        )));
        assert!(hub.is_empty());
        assert_eq!(hub.bound_count(), 0);
    }

    #[test]
    fn snapshot_reports_bound_and_unbound() {
        let mut hub = Hub::new();
        bind(&mut hub, 1, 1, 10);
        hub.register(2);

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.connections, 2);
        assert_eq!(snapshot.unbound(), 1);
        assert_eq!(snapshot.holder(IdentityKey::new(1, 10)), Some(1));
    }
}
