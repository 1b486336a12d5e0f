//! Messages exchanged between client and server.

use crate::command::PlayerCommand;
use crate::settings::GameSettings;
use crate::tick::Tick;
use crate::world::{
    EntityData, EntityKind, GhostId, HighestScoreRecord, NetworkId, PlayerScoreRecord, Weapon,
};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

/// Longest display name accepted in `PlayerName`, in bytes.
pub const MAX_NAME_BYTES: usize = 61;

/// How many of its newest commands a client repeats in every `Commands` packet.
pub const COMMANDS_PER_PACKET: usize = 4;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client -> server
    Connect {
        client_version: u32,
    },
    Disconnect,
    ClientGameLoaded,
    PlayerSpawnRequest,
    PlayerName {
        name: String,
    },
    Commands {
        commands: Vec<PlayerCommand>,
    },

    // Server -> client
    Connected {
        network_id: NetworkId,
    },
    Disconnected {
        reason: String,
    },
    ServerGameConfig(GameSettings),
    Snapshot {
        tick: Tick,
        /// Newest command from this connection not after `tick`.
        acked_command_tick: Option<Tick>,
        ghosts: Vec<GhostSnapshot>,
    },
}

/// Replicated state of one entity.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GhostSnapshot {
    pub ghost_id: GhostId,
    pub kind: EntityKind,
    pub spawn_tick: Tick,
    pub owner: Option<NetworkId>,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub cooldown_tick: Option<Tick>,
    pub score: Option<PlayerScoreRecord>,
    pub highest_score: Option<HighestScoreRecord>,
}

impl GhostSnapshot {
    /// Captures replicated state. Entities without a ghost id are not replicated.
    pub fn capture(data: &EntityData) -> Option<Self> {
        Some(Self {
            ghost_id: data.ghost_id?,
            kind: data.kind,
            spawn_tick: data.spawn_tick,
            owner: data.owner,
            position: data.transform.position,
            rotation: data.transform.rotation,
            velocity: data.velocity,
            cooldown_tick: data.weapon.and_then(|weapon| weapon.cooldown_tick),
            score: data.score.clone(),
            highest_score: data.highest_score.clone(),
        })
    }

    /// Overwrites the replicated fields of `data` with this snapshot.
    pub fn apply_to(&self, data: &mut EntityData) {
        data.ghost_id = Some(self.ghost_id);
        data.spawn_tick = self.spawn_tick;
        data.owner = self.owner;
        data.transform.position = self.position;
        data.transform.rotation = self.rotation;
        data.velocity = self.velocity;
        if let Some(weapon) = data.weapon.as_mut() {
            weapon.cooldown_tick = self.cooldown_tick;
        }
        data.score = self.score.clone();
        data.highest_score = self.highest_score.clone();
    }

    /// Builds a fresh client-side entity for a ghost seen for the first time.
    pub fn instantiate(&self, settings: &GameSettings) -> EntityData {
        let mut data = EntityData::instantiate(self.kind, settings, self.spawn_tick);
        if let Some(weapon) = data.weapon.as_mut() {
            *weapon = Weapon {
                offset: settings.weapon_offset,
                cooldown_tick: self.cooldown_tick,
            };
        }
        self.apply_to(&mut data);
        data
    }
}

/// Clips a display name to [`MAX_NAME_BYTES`] without splitting a character.
pub fn clamp_name(name: &str) -> String {
    if name.len() <= MAX_NAME_BYTES {
        return name.to_string();
    }
    let mut end = MAX_NAME_BYTES;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}
