//! Generational entity arena with capability-set components and a deferred
//! structural command queue.
//!
//! Entities are distinguished by what they carry (an [`EntityKind`] plus
//! optional components and [`Markers`]), never by type hierarchy. During a
//! parallel phase nothing may create, destroy or re-tag entities directly;
//! workers record intents into a [`CommandQueue`] which is played back at the
//! barrier after the phase.

use crate::command::CommandHistory;
use crate::settings::GameSettings;
use crate::tick::Tick;
use glam::{Quat, Vec3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Identity of a connection, stable for the lifetime of that connection.
pub type NetworkId = u32;

/// Replication identity of an entity, assigned by the server.
pub type GhostId = u32;

/// Handle into a [`World`]. Stale handles (entity since destroyed) resolve to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Spawn template / category of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Bullet,
    Asteroid,
    PlayerScore,
    HighestScore,
    /// Client-local view attached to the owned player; never replicated.
    Camera,
}

impl EntityKind {
    pub fn is_replicated(self) -> bool {
        !matches!(self, EntityKind::Camera)
    }

    /// Score entities drive UI and are sent to everyone regardless of distance.
    pub fn is_always_relevant(self) -> bool {
        matches!(self, EntityKind::PlayerScore | EntityKind::HighestScore)
    }

    /// Bullets are trigger volumes; everything else with a collider is solid.
    pub fn is_trigger(self) -> bool {
        matches!(self, EntityKind::Bullet)
    }
}

/// Transient tags attached to entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Deferred deletion request, consumed by the destruction pass.
    Destroy,
    /// Player instantiated by a spawn request whose completion has not run.
    SpawnInProgress,
    /// Client side: player ghost already examined for ownership.
    Classified,
    /// Client side: entity is backed by data from the latest snapshot.
    HasSnapshot,
}

impl Marker {
    fn bit(self) -> u8 {
        match self {
            Marker::Destroy => 1 << 0,
            Marker::SpawnInProgress => 1 << 1,
            Marker::Classified => 1 << 2,
            Marker::HasSnapshot => 1 << 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Markers(u8);

impl Markers {
    pub fn has(&self, marker: Marker) -> bool {
        self.0 & marker.bit() != 0
    }

    pub fn insert(&mut self, marker: Marker) {
        self.0 |= marker.bit();
    }

    pub fn remove(&mut self, marker: Marker) {
        self.0 &= !marker.bit();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

/// Marks an entity the local executor may re-simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prediction {
    /// Tick the entity was created at.
    pub spawn_tick: Tick,
    /// Last tick whose state is authoritative (from a snapshot, or the
    /// creation tick for locally spawned entities).
    pub applied_tick: Tick,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weapon {
    pub offset: Vec3,
    /// First tick at which the weapon may fire again; `None` until it has fired.
    pub cooldown_tick: Option<Tick>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulletAge {
    pub age: f32,
    pub max_age: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScoreRecord {
    pub network_id: NetworkId,
    pub name: String,
    pub current_score: i32,
    pub high_score: i32,
}

impl PlayerScoreRecord {
    pub fn new(network_id: NetworkId, name: impl Into<String>) -> Self {
        Self {
            network_id,
            name: name.into(),
            current_score: 0,
            high_score: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighestScoreRecord {
    pub name: String,
    pub value: i32,
}

/// Component storage for one entity.
#[derive(Debug, Clone)]
pub struct EntityData {
    pub kind: EntityKind,
    pub markers: Markers,
    pub ghost_id: Option<GhostId>,
    pub spawn_tick: Tick,
    pub transform: Transform,
    pub velocity: Vec3,
    /// Network id of the connection that owns (and may predict) this entity.
    pub owner: Option<NetworkId>,
    pub prediction: Option<Prediction>,
    pub weapon: Option<Weapon>,
    pub bullet_age: Option<BulletAge>,
    pub commands: Option<CommandHistory>,
    pub score: Option<PlayerScoreRecord>,
    pub highest_score: Option<HighestScoreRecord>,
    pub parent: Option<Entity>,
}

impl EntityData {
    /// Builds the component set for a template, the way a prefab would.
    pub fn instantiate(kind: EntityKind, settings: &GameSettings, tick: Tick) -> Self {
        let mut data = Self {
            kind,
            markers: Markers::default(),
            ghost_id: None,
            spawn_tick: tick,
            transform: Transform::default(),
            velocity: Vec3::ZERO,
            owner: None,
            prediction: None,
            weapon: None,
            bullet_age: None,
            commands: None,
            score: None,
            highest_score: None,
            parent: None,
        };
        match kind {
            EntityKind::Player => {
                data.weapon = Some(Weapon {
                    offset: settings.weapon_offset,
                    cooldown_tick: None,
                });
                data.commands = Some(CommandHistory::new());
            }
            EntityKind::Bullet => {
                data.bullet_age = Some(BulletAge {
                    age: 0.0,
                    max_age: settings.bullet_max_age,
                });
            }
            EntityKind::HighestScore => {
                data.highest_score = Some(HighestScoreRecord::default());
            }
            EntityKind::Asteroid | EntityKind::PlayerScore | EntityKind::Camera => {}
        }
        data
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.transform.rotation = rotation;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_owner(mut self, owner: NetworkId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.insert(marker);
        self
    }

    pub fn with_prediction(mut self, tick: Tick) -> Self {
        self.prediction = Some(Prediction {
            spawn_tick: tick,
            applied_tick: tick,
        });
        self
    }

    pub fn with_score(mut self, record: PlayerScoreRecord) -> Self {
        self.score = Some(record);
        self
    }

    pub fn with_parent(mut self, parent: Entity) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn has(&self, marker: Marker) -> bool {
        self.markers.has(marker)
    }

    pub fn is(&self, kind: EntityKind) -> bool {
        self.kind == kind
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    data: Option<EntityData>,
}

/// Arena of entities addressed by generational [`Entity`] handles.
#[derive(Debug, Clone)]
pub struct World {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    /// Server worlds hand out ghost ids to replicated entities on spawn.
    assign_ghost_ids: bool,
    next_ghost_id: GhostId,
}

impl World {
    /// World whose replicated entities get fresh ghost ids when spawned.
    pub fn authoritative() -> Self {
        Self {
            assign_ghost_ids: true,
            ..Self::replica()
        }
    }

    /// World whose ghost ids come from elsewhere (snapshots).
    pub fn replica() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            assign_ghost_ids: false,
            next_ghost_id: 1,
        }
    }

    pub fn spawn(&mut self, mut data: EntityData) -> Entity {
        if self.assign_ghost_ids && data.kind.is_replicated() && data.ghost_id.is_none() {
            data.ghost_id = Some(self.next_ghost_id);
            self.next_ghost_id = self.next_ghost_id.wrapping_add(1).max(1);
        }
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.data = Some(data);
                Entity {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    data: Some(data),
                });
                Entity {
                    index,
                    generation: 0,
                }
            }
        }
    }

    /// Removes the entity. Stale handles are ignored and return `None`.
    pub fn despawn(&mut self, entity: Entity) -> Option<EntityData> {
        let slot = self.slots.get_mut(entity.index as usize)?;
        if slot.generation != entity.generation {
            return None;
        }
        let data = slot.data.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(entity.index);
        self.live -= 1;
        Some(data)
    }

    pub fn get(&self, entity: Entity) -> Option<&EntityData> {
        self.slots
            .get(entity.index as usize)
            .filter(|slot| slot.generation == entity.generation)
            .and_then(|slot| slot.data.as_ref())
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut EntityData> {
        self.slots
            .get_mut(entity.index as usize)
            .filter(|slot| slot.generation == entity.generation)
            .and_then(|slot| slot.data.as_mut())
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.get(entity).is_some()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &EntityData)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.data.as_ref().map(|data| {
                (
                    Entity {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    data,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut EntityData)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.data.as_mut().map(|data| {
                (
                    Entity {
                        index: index as u32,
                        generation,
                    },
                    data,
                )
            })
        })
    }

    /// Parallel read-only view over every live entity.
    pub fn par_iter(&self) -> impl ParallelIterator<Item = (Entity, &EntityData)> + '_ {
        self.slots
            .par_iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.data.as_ref().map(|data| {
                    (
                        Entity {
                            index: index as u32,
                            generation: slot.generation,
                        },
                        data,
                    )
                })
            })
    }

    /// Runs `job` over every live entity on the worker pool.
    ///
    /// Each invocation may mutate only its own entity; structural changes go
    /// into the provided queue. Queues are merged in entity order, so the
    /// result does not depend on how work was split between threads.
    pub fn par_for_each<F>(&mut self, job: F) -> CommandQueue
    where
        F: Fn(Entity, &mut EntityData, &mut CommandQueue) + Send + Sync,
    {
        let recorded: Vec<CommandQueue> = self
            .slots
            .par_iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                let generation = slot.generation;
                slot.data.as_mut().map(|data| {
                    let mut queue = CommandQueue::new();
                    job(
                        Entity {
                            index: index as u32,
                            generation,
                        },
                        data,
                        &mut queue,
                    );
                    queue
                })
            })
            .collect();

        let mut merged = CommandQueue::new();
        for queue in recorded {
            merged.append(queue);
        }
        merged
    }

    /// Materialises the handles of every entity matching `filter`.
    pub fn query<F>(&self, filter: F) -> Vec<Entity>
    where
        F: Fn(&EntityData) -> bool,
    {
        self.iter()
            .filter(|(_, data)| filter(data))
            .map(|(entity, _)| entity)
            .collect()
    }

    pub fn count<F>(&self, filter: F) -> usize
    where
        F: Fn(&EntityData) -> bool,
    {
        self.iter().filter(|(_, data)| filter(data)).count()
    }
}

/// A recorded structural change.
#[derive(Debug, Clone)]
pub enum StructuralCommand {
    Spawn(Box<EntityData>),
    Despawn(Entity),
    Mark(Entity, Marker),
    Unmark(Entity, Marker),
}

/// Intents recorded during a phase and applied at its barrier.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    commands: Vec<StructuralCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, data: EntityData) {
        self.commands.push(StructuralCommand::Spawn(Box::new(data)));
    }

    pub fn despawn(&mut self, entity: Entity) {
        self.commands.push(StructuralCommand::Despawn(entity));
    }

    pub fn mark(&mut self, entity: Entity, marker: Marker) {
        self.commands.push(StructuralCommand::Mark(entity, marker));
    }

    pub fn unmark(&mut self, entity: Entity, marker: Marker) {
        self.commands.push(StructuralCommand::Unmark(entity, marker));
    }

    pub fn append(&mut self, mut other: CommandQueue) {
        self.commands.append(&mut other.commands);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[StructuralCommand] {
        &self.commands
    }

    /// Applies every recorded command in order and empties the queue.
    ///
    /// Returns the entities created by `Spawn` commands, in recording order.
    /// Commands aimed at entities that no longer exist are dropped.
    pub fn playback(&mut self, world: &mut World) -> Vec<Entity> {
        let mut spawned = Vec::new();
        for command in self.commands.drain(..) {
            match command {
                StructuralCommand::Spawn(data) => spawned.push(world.spawn(*data)),
                StructuralCommand::Despawn(entity) => {
                    world.despawn(entity);
                }
                StructuralCommand::Mark(entity, marker) => {
                    if let Some(data) = world.get_mut(entity) {
                        data.markers.insert(marker);
                    }
                }
                StructuralCommand::Unmark(entity, marker) => {
                    if let Some(data) = world.get_mut(entity) {
                        data.markers.remove(marker);
                    }
                }
            }
        }
        spawned
    }
}
