//! Wire format for the Courier relay.
//!
//! Clients speak JSON over WebSocket text frames. Every inbound message
//! carries the sender's identity key (`user_type` + `from`) and the numeric ID
//! of the intended recipient in the same realm (`id`). The relay answers with
//! a smaller outbound shape that only names the original sender.
//!
//! The codec is deliberately forgiving: missing fields decode to zero or the
//! empty string, unknown fields are ignored, and embedded newlines are folded
//! into spaces before parsing. Anything that still fails to parse is reported
//! as a [`ProtocolError`] so the caller can discard that single frame.
//!
//! # Batching
//!
//! The outbound side may coalesce several queued messages into one transport
//! write. Batches are newline-delimited, see [`frame::join_frames`].
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod frame;
pub mod identity;
pub mod message;

pub use errors::{ProtocolError, Result};
pub use frame::{join_frames, normalize};
pub use identity::IdentityKey;
pub use message::{InboundMessage, OutboundMessage};
