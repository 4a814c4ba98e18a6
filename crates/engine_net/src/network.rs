//! The network side of the world: who is connected, which local entity
//! stands for which remote object, and the action queues.
//!
//! A network object is identified across machines by `(owner_id,
//! network_id)`. [`NetworkWorld`] keeps an index from that pair to the local
//! [`Entity`] and keeps it in step with the [`NetworkObject`] component.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::time::Instant;

use engine_component::{Component, DenseStorage, EcsError, Entity, World};
use engine_math::Transform3D;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actions::NetworkWorldAction;
use crate::config::NetworkConfig;
use crate::transport::Transport;

/// Prefab name of user avatars.
pub const AVATAR_PREFAB: &str = "avatar";

/// Default cap for [`NetworkWorld::get_nearby_users`].
pub const DEFAULT_MAX_NEARBY_USERS: usize = 8;

/// Stable identity of a user across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// A fresh random id.
    #[must_use]
    pub fn new_random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object id, unique per owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub u32);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marks an entity as replicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkObject {
    /// The user who owns this object.
    pub owner_id: UserId,
    /// Unique only per owner.
    pub network_id: NetworkId,
    /// Registered prefab the object was spawned from.
    pub prefab: String,
    /// Arguments the prefab was spawned with.
    pub parameters: serde_json::Value,
}

impl NetworkObject {
    #[must_use]
    pub fn new(owner_id: UserId, network_id: NetworkId, prefab: impl Into<String>) -> Self {
        Self {
            owner_id,
            network_id,
            prefab: prefab.into(),
            parameters: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

impl Component for NetworkObject {
    type Storage = DenseStorage<Self>;

    fn type_name() -> &'static str {
        "NetworkObject"
    }
}

/// Present when this machine simulates the entity. Incoming state for
/// tagged entities is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkObjectAuthorityTag;

impl Component for NetworkObjectAuthorityTag {
    type Storage = DenseStorage<Self>;

    fn type_name() -> &'static str {
        "NetworkObjectAuthorityTag"
    }
}

/// A connected user.
#[derive(Debug, Clone)]
pub struct NetworkClient {
    pub user_id: UserId,
    /// Compact id used in packet headers.
    pub index: u32,
    pub name: String,
    pub last_seen: Instant,
}

/// Result row of [`NetworkWorld::get_nearby_users`].
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyUser {
    pub user_id: UserId,
    pub distance: f32,
}

/// Connected users, replicated objects and pending actions.
#[derive(Debug)]
pub struct NetworkWorld {
    config: NetworkConfig,
    user_id: UserId,
    is_hosting: bool,
    fixed_tick: u32,
    user_id_to_user_index: HashMap<UserId, u32>,
    user_index_to_user_id: HashMap<u32, UserId>,
    next_user_index: u32,
    clients: BTreeMap<UserId, NetworkClient>,
    objects: HashMap<(UserId, NetworkId), Entity>,
    next_network_id: u32,
    incoming: VecDeque<NetworkWorldAction>,
    outgoing: Vec<NetworkWorldAction>,
    transport: Option<Box<dyn Transport>>,
}

impl NetworkWorld {
    #[must_use]
    pub fn new(user_id: UserId, is_hosting: bool, config: NetworkConfig) -> Self {
        Self {
            config,
            user_id,
            is_hosting,
            fixed_tick: 0,
            user_id_to_user_index: HashMap::new(),
            user_index_to_user_id: HashMap::new(),
            next_user_index: 0,
            clients: BTreeMap::new(),
            objects: HashMap::new(),
            next_network_id: 1,
            incoming: VecDeque::new(),
            outgoing: Vec::new(),
            transport: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// The local user.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn is_hosting(&self) -> bool {
        self.is_hosting
    }

    #[must_use]
    pub fn fixed_tick(&self) -> u32 {
        self.fixed_tick
    }

    pub fn set_fixed_tick(&mut self, fixed_tick: u32) {
        self.fixed_tick = fixed_tick;
    }

    /// Advances the fixed tick by one and returns the new value.
    pub fn advance_fixed_tick(&mut self) -> u32 {
        self.fixed_tick = self.fixed_tick.wrapping_add(1);
        self.fixed_tick
    }

    // ── Users ───────────────────────────────────────────────────────────────

    #[must_use]
    pub fn user_index(&self, user_id: &UserId) -> Option<u32> {
        self.user_id_to_user_index.get(user_id).copied()
    }

    #[must_use]
    pub fn user_id_for_index(&self, user_index: u32) -> Option<&UserId> {
        self.user_index_to_user_id.get(&user_index)
    }

    /// Binds a user to a packet-header index, replacing earlier bindings of
    /// either side.
    pub fn map_user_index(&mut self, user_id: UserId, user_index: u32) {
        if let Some(old) = self.user_id_to_user_index.remove(&user_id) {
            self.user_index_to_user_id.remove(&old);
        }
        if let Some(old) = self.user_index_to_user_id.remove(&user_index) {
            self.user_id_to_user_index.remove(&old);
        }
        self.user_id_to_user_index.insert(user_id.clone(), user_index);
        self.user_index_to_user_id.insert(user_index, user_id);
        self.next_user_index = self.next_user_index.max(user_index.wrapping_add(1));
    }

    fn unmap_user(&mut self, user_id: &UserId) {
        if let Some(index) = self.user_id_to_user_index.remove(user_id) {
            self.user_index_to_user_id.remove(&index);
        }
    }

    /// Host side of a join: picks the next user index and dispatches the
    /// `CreateClient` action. Returns the assigned index.
    pub fn admit_client(&mut self, user_id: UserId, name: impl Into<String>) -> u32 {
        if let Some(index) = self.user_index(&user_id) {
            return index;
        }
        let user_index = self.next_user_index;
        self.next_user_index += 1;
        self.dispatch_action(NetworkWorldAction::CreateClient {
            user_id,
            user_index,
            name: name.into(),
        });
        user_index
    }

    pub fn clients(&self) -> impl Iterator<Item = &NetworkClient> {
        self.clients.values()
    }

    #[must_use]
    pub fn client(&self, user_id: &UserId) -> Option<&NetworkClient> {
        self.clients.get(user_id)
    }

    /// Records that a user was heard from.
    pub fn touch_client(&mut self, user_id: &UserId, now: Instant) {
        if let Some(client) = self.clients.get_mut(user_id) {
            client.last_seen = now;
        }
    }

    // ── Network objects ─────────────────────────────────────────────────────

    /// A network id not yet used by the local user.
    pub fn allocate_network_id(&mut self) -> NetworkId {
        let id = NetworkId(self.next_network_id);
        self.next_network_id += 1;
        id
    }

    /// Creates the local entity for a network object. The authority tag is
    /// added when the local user owns it. Spawning an already known object
    /// returns its entity.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError`] if a component cannot be attached.
    pub fn spawn_network_object(
        &mut self,
        world: &mut World,
        object: NetworkObject,
        transform: Transform3D,
    ) -> Result<Entity, EcsError> {
        if let Some(entity) = self.get_network_object(world, &object.owner_id, object.network_id) {
            debug!(owner_id = %object.owner_id, network_id = %object.network_id, "network object already spawned");
            return Ok(entity);
        }

        let key = (object.owner_id.clone(), object.network_id);
        let owned = object.owner_id == self.user_id;
        if owned && object.network_id.0 >= self.next_network_id {
            self.next_network_id = object.network_id.0 + 1;
        }

        let entity = world.create_entity();
        debug!(
            %entity,
            owner_id = %object.owner_id,
            network_id = %object.network_id,
            prefab = %object.prefab,
            "network object spawned"
        );
        world.add_component(entity, object)?;
        world.add_component(entity, transform)?;
        if owned {
            world.add_component(entity, NetworkObjectAuthorityTag)?;
        }
        self.objects.insert(key, entity);
        Ok(entity)
    }

    /// Removes a network object. The entity goes away at the end of the
    /// tick. Returns `false` if the object was unknown.
    pub fn despawn_network_object(
        &mut self,
        world: &mut World,
        owner_id: &UserId,
        network_id: NetworkId,
    ) -> bool {
        let Some(entity) = self.objects.remove(&(owner_id.clone(), network_id)) else {
            return false;
        };
        if world.remove_entity(entity, false).is_err() {
            return false;
        }
        debug!(%entity, %owner_id, %network_id, "network object despawned");
        true
    }

    /// The live entity of a network object.
    #[must_use]
    pub fn get_network_object(
        &self,
        world: &World,
        owner_id: &UserId,
        network_id: NetworkId,
    ) -> Option<Entity> {
        let entity = *self.objects.get(&(owner_id.clone(), network_id))?;
        let object = world.component::<NetworkObject>(entity)?;
        (object.owner_id == *owner_id && object.network_id == network_id).then_some(entity)
    }

    /// Every indexed network object.
    pub fn network_objects(&self) -> impl Iterator<Item = (&UserId, NetworkId, Entity)> {
        self.objects
            .iter()
            .map(|((owner, id), entity)| (owner, *id, *entity))
    }

    /// The avatar owned by `user_id`.
    #[must_use]
    pub fn get_user_avatar_entity(&self, world: &World, user_id: &UserId) -> Option<Entity> {
        self.objects
            .iter()
            .filter(|((owner, _), _)| owner == user_id)
            .map(|(_, entity)| *entity)
            .find(|entity| {
                world
                    .component::<NetworkObject>(*entity)
                    .is_some_and(|object| object.prefab == AVATAR_PREFAB)
            })
    }

    /// Other connected users ordered by avatar distance to `user_id`, at most
    /// `max` of them. Users without an avatar are left out; if `user_id` has
    /// no avatar the result is empty.
    #[must_use]
    pub fn get_nearby_users(&self, world: &World, user_id: &UserId, max: usize) -> Vec<NearbyUser> {
        let Some(origin) = self
            .get_user_avatar_entity(world, user_id)
            .and_then(|avatar| world.get_component::<Transform3D>(avatar))
        else {
            return Vec::new();
        };

        let mut nearby: Vec<NearbyUser> = self
            .clients
            .keys()
            .filter(|other| *other != user_id)
            .filter_map(|other| {
                let avatar = self.get_user_avatar_entity(world, other)?;
                let transform = world.get_component::<Transform3D>(avatar)?;
                Some(NearbyUser {
                    user_id: other.clone(),
                    distance: transform.position.distance(origin.position),
                })
            })
            .collect();
        nearby.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        nearby.truncate(max);
        nearby
    }

    /// Drops clients not heard from within the configured timeout by
    /// dispatching `DestroyClient` for each. The local user is never dropped.
    /// Returns the dropped users.
    pub fn validate_network_objects(&mut self, now: Instant) -> Vec<UserId> {
        let timeout = self.config.client_timeout();
        let stale: Vec<UserId> = self
            .clients
            .values()
            .filter(|client| client.user_id != self.user_id)
            .filter(|client| now.saturating_duration_since(client.last_seen) > timeout)
            .map(|client| client.user_id.clone())
            .collect();

        for user_id in &stale {
            info!(%user_id, "removing client due to inactivity");
            self.dispatch_action(NetworkWorldAction::DestroyClient {
                user_id: user_id.clone(),
            });
        }
        stale
    }

    // ── Actions ─────────────────────────────────────────────────────────────

    /// Queues an action to apply locally and to send to peers.
    pub fn dispatch_action(&mut self, action: NetworkWorldAction) {
        debug!(action = action.kind(), "action dispatched");
        self.incoming.push_back(action.clone());
        self.outgoing.push(action);
    }

    /// Queues actions received from a peer.
    pub fn receive_actions(&mut self, actions: impl IntoIterator<Item = NetworkWorldAction>) {
        self.incoming.extend(actions);
    }

    /// Actions waiting to be sent, emptying the queue.
    pub fn take_outgoing_actions(&mut self) -> Vec<NetworkWorldAction> {
        std::mem::take(&mut self.outgoing)
    }

    #[must_use]
    pub fn pending_incoming(&self) -> usize {
        self.incoming.len()
    }

    /// Applies every queued incoming action in arrival order. Actions that
    /// fail are logged and dropped. Returns how many were applied.
    pub fn apply_incoming_actions(&mut self, world: &mut World) -> usize {
        let mut applied = 0;
        while let Some(action) = self.incoming.pop_front() {
            let kind = action.kind();
            match self.apply_action(world, action) {
                Ok(()) => applied += 1,
                Err(e) => warn!(action = kind, error = %e, "failed to apply action"),
            }
        }
        applied
    }

    fn apply_action(&mut self, world: &mut World, action: NetworkWorldAction) -> Result<(), EcsError> {
        match action {
            NetworkWorldAction::CreateClient {
                user_id,
                user_index,
                name,
            } => {
                info!(%user_id, user_index, %name, "client joined");
                self.map_user_index(user_id.clone(), user_index);
                self.clients.insert(
                    user_id.clone(),
                    NetworkClient {
                        user_id,
                        index: user_index,
                        name,
                        last_seen: Instant::now(),
                    },
                );
            }
            NetworkWorldAction::DestroyClient { user_id } => {
                info!(%user_id, "client left");
                self.clients.remove(&user_id);
                self.unmap_user(&user_id);
                let owned: Vec<NetworkId> = self
                    .objects
                    .keys()
                    .filter(|(owner, _)| *owner == user_id)
                    .map(|(_, id)| *id)
                    .collect();
                for network_id in owned {
                    self.despawn_network_object(world, &user_id, network_id);
                }
            }
            NetworkWorldAction::SpawnObject { object, transform } => {
                self.spawn_network_object(world, object, transform)?;
            }
            NetworkWorldAction::DestroyObject {
                owner_id,
                network_id,
            } => {
                self.despawn_network_object(world, &owner_id, network_id);
            }
            NetworkWorldAction::TransferAuthority {
                owner_id,
                network_id,
                new_authority,
            } => {
                let Some(entity) = self.get_network_object(world, &owner_id, network_id) else {
                    debug!(%owner_id, %network_id, "authority transfer for unknown object");
                    return Ok(());
                };
                if new_authority == self.user_id {
                    world.add_component(entity, NetworkObjectAuthorityTag)?;
                } else {
                    world.remove_component::<NetworkObjectAuthorityTag>(entity, false)?;
                }
                debug!(%entity, %new_authority, "authority transferred");
            }
            NetworkWorldAction::TimeSync { fixed_tick } => {
                if !self.is_hosting {
                    debug!(from = self.fixed_tick, to = fixed_tick, "fixed tick synced");
                    self.fixed_tick = fixed_tick;
                }
            }
        }
        Ok(())
    }

    // ── Transport ───────────────────────────────────────────────────────────

    pub fn set_transport(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
    }

    pub fn transport_mut(&mut self) -> Option<&mut (dyn Transport + 'static)> {
        self.transport.as_deref_mut()
    }
}
