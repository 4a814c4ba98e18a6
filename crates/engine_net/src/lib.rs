//! # engine_net
//!
//! State synchronisation for the networked ECS.
//!
//! This crate provides:
//!
//! - [`cursor`]: a fixed-capacity byte buffer with explicit marks and slots.
//! - [`shadow`]: per-writer last-sent values used for change detection.
//! - [`writer`] / [`reader`]: the change-masked state packet format.
//! - [`network`]: users, network objects and the action queues.
//! - [`actions`] / [`codec`]: world actions and their MessagePack batches.
//! - [`transport`]: the byte-moving collaborator.

pub mod actions;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod error;
pub mod network;
pub mod reader;
pub mod shadow;
pub mod transport;
pub mod writer;

pub use actions::NetworkWorldAction;
pub use codec::{decode, decode_actions, encode, encode_actions};
pub use config::NetworkConfig;
pub use cursor::{ChangeMask, CursorError, Mark, Record, Slot, ViewCursor};
pub use error::NetError;
pub use network::{
    AVATAR_PREFAB, DEFAULT_MAX_NEARBY_USERS, NearbyUser, NetworkClient, NetworkId, NetworkObject, NetworkObjectAuthorityTag, NetworkWorld, UserId,
};
pub use reader::{DataReader, ReadStats, check_bitflag};
pub use shadow::ShadowCache;
pub use transport::{ChannelTransport, Message, Transport};
pub use writer::DataWriter;
