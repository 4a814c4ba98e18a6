//! Actions that change the shared network world.
//!
//! Actions are dispatched locally, queued for sending, and applied on every
//! peer by [`NetworkWorld::apply_incoming_actions`](crate::NetworkWorld::apply_incoming_actions).

use engine_math::Transform3D;
use serde::{Deserialize, Serialize};

use crate::network::{NetworkId, NetworkObject, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetworkWorldAction {
    /// A user joined and was given a user index by the host.
    CreateClient {
        user_id: UserId,
        user_index: u32,
        name: String,
    },
    /// A user left or timed out. Their objects go with them.
    DestroyClient { user_id: UserId },
    SpawnObject {
        object: NetworkObject,
        transform: Transform3D,
    },
    DestroyObject {
        owner_id: UserId,
        network_id: NetworkId,
    },
    /// Hand simulation authority over an object to another user.
    TransferAuthority {
        owner_id: UserId,
        network_id: NetworkId,
        new_authority: UserId,
    },
    /// The host's fixed tick, adopted by clients.
    TimeSync { fixed_tick: u32 },
}

impl NetworkWorldAction {
    /// Short name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateClient { .. } => "create_client",
            Self::DestroyClient { .. } => "destroy_client",
            Self::SpawnObject { .. } => "spawn_object",
            Self::DestroyObject { .. } => "destroy_object",
            Self::TransferAuthority { .. } => "transfer_authority",
            Self::TimeSync { .. } => "time_sync",
        }
    }
}
