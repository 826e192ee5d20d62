//! Hub error types.

use courier_proto::ProtocolError;
use thiserror::Error;

/// Errors raised by hub operations.
///
/// Routing misses and rejected bindings are outcomes, not errors; they are
/// reported as [`crate::HubAction`]s.
#[derive(Debug, Error)]
pub enum HubError {
    /// Building the outbound frame failed
    #[error("failed to encode outbound frame: {0}")]
    Encode(#[from] ProtocolError),
}
