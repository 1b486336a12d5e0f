//! Per-connection network identities.
//!
//! An identity is the server's view of one connection inside the simulation:
//! which entity it controls, whether it finished loading, whether a spawn is
//! in flight and whether the transport reported it gone. Entities refer to
//! identities by [`NetworkId`] and identities refer to entities by handle;
//! neither owns the other.

use log::{debug, info};
use shared::{Entity, NetworkId};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub network_id: NetworkId,
    /// Entity this connection currently controls. At most one at a time.
    pub target: Option<Entity>,
    /// Set once the client reported it finished loading; enables snapshots
    /// and spawn requests.
    pub in_game: bool,
    /// A spawn request was accepted and its completion has not run yet.
    pub spawning: bool,
    /// The transport reported this connection gone. Observed by the next
    /// cleanup and spawn-completion passes.
    pub disconnected: bool,
    /// `ServerGameConfig` already went out on this connection.
    pub config_sent: bool,
}

impl NetworkIdentity {
    pub fn new(network_id: NetworkId) -> Self {
        Self {
            network_id,
            target: None,
            in_game: false,
            spawning: false,
            disconnected: false,
            config_sent: false,
        }
    }

    /// Connected and not yet flagged as disconnected.
    pub fn is_alive(&self) -> bool {
        !self.disconnected
    }

    /// Ready to accept a spawn request: in game, nothing controlled, nothing pending.
    pub fn can_spawn(&self) -> bool {
        self.is_alive() && self.in_game && self.target.is_none() && !self.spawning
    }
}

/// All identities, ordered by network id so every pass visits them in the
/// same order.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    identities: BTreeMap<NetworkId, NetworkIdentity>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh identity. Returns false if the id is already known.
    pub fn insert(&mut self, network_id: NetworkId) -> bool {
        if self.identities.contains_key(&network_id) {
            return false;
        }
        self.identities
            .insert(network_id, NetworkIdentity::new(network_id));
        true
    }

    pub fn get(&self, network_id: NetworkId) -> Option<&NetworkIdentity> {
        self.identities.get(&network_id)
    }

    pub fn get_mut(&mut self, network_id: NetworkId) -> Option<&mut NetworkIdentity> {
        self.identities.get_mut(&network_id)
    }

    /// True if the identity exists and is not flagged as disconnected.
    pub fn is_alive(&self, network_id: NetworkId) -> bool {
        self.get(network_id).map_or(false, NetworkIdentity::is_alive)
    }

    /// Flags a connection as gone; the actual cleanup happens on the next tick.
    pub fn mark_disconnected(&mut self, network_id: NetworkId) -> bool {
        match self.identities.get_mut(&network_id) {
            Some(identity) if !identity.disconnected => {
                info!("Connection {} marked disconnected", network_id);
                identity.disconnected = true;
                true
            }
            _ => false,
        }
    }

    pub fn disconnected_ids(&self) -> Vec<NetworkId> {
        self.identities
            .values()
            .filter(|identity| identity.disconnected)
            .map(|identity| identity.network_id)
            .collect()
    }

    /// Drops every identity flagged as disconnected and returns their ids.
    pub fn remove_disconnected(&mut self) -> Vec<NetworkId> {
        let removed = self.disconnected_ids();
        for network_id in &removed {
            self.identities.remove(network_id);
            debug!("Removed identity {}", network_id);
        }
        removed
    }

    /// Clears `target` on whichever identity points at `entity`.
    pub fn clear_target(&mut self, entity: Entity) -> Option<NetworkId> {
        let identity = self
            .identities
            .values_mut()
            .find(|identity| identity.target == Some(entity))?;
        identity.target = None;
        Some(identity.network_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkIdentity> {
        self.identities.values()
    }

    /// Live identities that have not been sent the game config yet.
    pub fn awaiting_config(&mut self) -> impl Iterator<Item = &mut NetworkIdentity> {
        self.identities
            .values_mut()
            .filter(|identity| identity.is_alive() && !identity.config_sent)
    }

    /// Live identities that finished loading.
    pub fn in_game(&self) -> impl Iterator<Item = &NetworkIdentity> {
        self.identities
            .values()
            .filter(|identity| identity.is_alive() && identity.in_game)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
