//! Network-layer error types.

use engine_component::EcsError;

use crate::cursor::CursorError;
use crate::network::UserId;

/// Errors that can occur while encoding, decoding or exchanging state.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to encode an action batch to MessagePack.
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode an action batch from MessagePack.
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The data packet did not fit the buffer, or ended early.
    #[error("packet cursor: {0}")]
    Cursor(#[from] CursorError),

    /// The local user has no user index yet.
    #[error("no user index for {0}")]
    UnknownUser(UserId),

    /// A component wider than the largest change mask.
    #[error("component has {0} fields, at most 64 can be masked")]
    TooManyFields(usize),

    /// Applying a decoded change to the world failed.
    #[error(transparent)]
    Ecs(#[from] EcsError),

    /// The peer end of a transport is gone.
    #[error("transport closed: {0}")]
    Transport(String),
}
