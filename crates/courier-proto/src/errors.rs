//! Codec errors.

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while decoding or encoding relay messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is larger than the configured read limit.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge {
        /// Size of the offending frame
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Frame was empty once surrounding whitespace was removed.
    #[error("frame is empty")]
    Empty,

    /// Payload is not a valid JSON message.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Check a frame length against the read limit.
    pub fn check_size(size: usize, max: usize) -> Result<()> {
        if size > max {
            return Err(Self::MessageTooLarge { size, max });
        }
        Ok(())
    }
}
