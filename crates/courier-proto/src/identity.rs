//! Identity keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Composite address of one logical participant.
///
/// A key is unique across all live connections at any instant. The realm
/// partitions the ID space (for example staff and customers), so `1:10` and
/// `0:10` are different participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    /// Realm (wire field `user_type`)
    pub realm: i64,
    /// Numeric ID within the realm
    pub id: i64,
}

impl IdentityKey {
    /// Create a key from its parts.
    pub const fn new(realm: i64, id: i64) -> Self {
        Self { realm, id }
    }

    /// Key of another participant in the same realm.
    #[must_use]
    pub const fn peer(self, id: i64) -> Self {
        Self { realm: self.realm, id }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.realm, self.id)
    }
}
