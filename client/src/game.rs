//! Client-side game state: snapshot application, ghost classification and
//! re-simulation of locally owned entities.

use crate::input::InputAction;
use log::{debug, info, warn};
use shared::prediction::replay_range;
use shared::protocol::COMMANDS_PER_PACKET;
use shared::simulation::{integrate_all, simulate_controlled};
use shared::{
    CommandHistory, CommandQueue, Entity, EntityData, EntityKind, Executor, GameSettings, GhostId, GhostSnapshot,
    Marker, NetworkId, Packet, StepContext, Tick, World, PROTOCOL_VERSION,
};
use std::collections::HashMap;

/// Ticks either side of a server spawn tick within which a predicted bullet
/// is accepted as the same bullet.
pub const PREDICTED_SPAWN_WINDOW: u32 = 5;

/// The predicted tick is snapped back to its target once it strays further.
pub const MAX_CLOCK_DRIFT: i32 = 8;

pub const DEFAULT_LEAD_TICKS: u32 = 6;

/// Tracks the tick the client is predicting.
///
/// The target is always `last_snapshot_tick + lead_ticks`; between snapshots
/// the clock simply steps forward by one.
#[derive(Debug, Clone)]
pub struct ClientTickClock {
    predicted: Option<Tick>,
    lead_ticks: u32,
}

impl ClientTickClock {
    pub fn new(lead_ticks: u32) -> Self {
        Self {
            predicted: None,
            lead_ticks,
        }
    }

    pub fn predicted(&self) -> Option<Tick> {
        self.predicted
    }

    pub fn lead_ticks(&self) -> u32 {
        self.lead_ticks
    }

    /// Steps to the next predicted tick given the newest snapshot tick.
    pub fn advance(&mut self, last_snapshot: Tick) -> Tick {
        let target = last_snapshot.offset(self.lead_ticks);
        let next = match self.predicted {
            Some(predicted) => {
                let next = predicted.next();
                let drift = next.ticks_since(target);
                if drift.abs() > MAX_CLOCK_DRIFT {
                    debug!("Resyncing predicted tick {} -> {} (drift {})", next, target, drift);
                    target
                } else {
                    next
                }
            }
            None => target,
        };
        self.predicted = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.predicted = None;
    }
}

/// A bullet spawned locally during prediction, waiting for its server ghost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictedSpawn {
    pub entity: Entity,
    pub spawn_tick: Tick,
}

impl PredictedSpawn {
    /// Whether a ghost spawned by the server at `server_spawn` is this bullet.
    pub fn matches(&self, server_spawn: Tick) -> bool {
        server_spawn
            .offset(PREDICTED_SPAWN_WINDOW)
            .is_at_or_after(self.spawn_tick)
            && self
                .spawn_tick
                .offset(PREDICTED_SPAWN_WINDOW)
                .is_newer_than(server_spawn)
    }

    /// Whether no snapshot at or after `snapshot_tick` can still match it.
    pub fn is_expired(&self, snapshot_tick: Tick) -> bool {
        snapshot_tick.ticks_since(self.spawn_tick) > PREDICTED_SPAWN_WINDOW as i32
    }
}

pub struct ClientGame {
    name: String,
    network_id: Option<NetworkId>,
    settings: Option<GameSettings>,
    in_game: bool,
    world: World,
    ghosts: HashMap<GhostId, Entity>,
    target: Option<Entity>,
    camera: Option<Entity>,
    predicted_spawns: Vec<PredictedSpawn>,
    clock: ClientTickClock,
    last_snapshot_tick: Option<Tick>,
    acked_command_tick: Option<Tick>,
    last_predicted_tick: Option<Tick>,
    replay_pending: bool,
}

impl ClientGame {
    pub fn new(name: impl Into<String>, lead_ticks: u32) -> Self {
        Self {
            name: name.into(),
            network_id: None,
            settings: None,
            in_game: false,
            world: World::replica(),
            ghosts: HashMap::new(),
            target: None,
            camera: None,
            predicted_spawns: Vec::new(),
            clock: ClientTickClock::new(lead_ticks),
            last_snapshot_tick: None,
            acked_command_tick: None,
            last_predicted_tick: None,
            replay_pending: false,
        }
    }

    pub fn connect_packet() -> Packet {
        Packet::Connect {
            client_version: PROTOCOL_VERSION,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network_id(&self) -> Option<NetworkId> {
        self.network_id
    }

    pub fn settings(&self) -> Option<&GameSettings> {
        self.settings.as_ref()
    }

    pub fn in_game(&self) -> bool {
        self.in_game
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// The locally controlled entity, once the server has confirmed it.
    pub fn target(&self) -> Option<Entity> {
        self.target
    }

    pub fn camera(&self) -> Option<Entity> {
        self.camera
    }

    pub fn ghost(&self, ghost_id: GhostId) -> Option<Entity> {
        self.ghosts.get(&ghost_id).copied()
    }

    pub fn ghost_count(&self) -> usize {
        self.ghosts.len()
    }

    pub fn predicted_spawns(&self) -> &[PredictedSpawn] {
        &self.predicted_spawns
    }

    pub fn predicted_tick(&self) -> Option<Tick> {
        self.clock.predicted()
    }

    pub fn last_snapshot_tick(&self) -> Option<Tick> {
        self.last_snapshot_tick
    }

    pub fn acked_command_tick(&self) -> Option<Tick> {
        self.acked_command_tick
    }

    /// Handles one packet from the server and returns the replies to send.
    pub fn handle_packet(&mut self, packet: Packet) -> Vec<Packet> {
        match packet {
            Packet::Connected { network_id } => {
                info!("Connected with network id {}", network_id);
                self.network_id = Some(network_id);
                Vec::new()
            }
            Packet::ServerGameConfig(settings) => {
                if self.in_game {
                    debug!("Ignoring repeated game config");
                    return Vec::new();
                }
                info!(
                    "Game config received: level {}x{}x{} at {}Hz",
                    settings.level_width, settings.level_height, settings.level_depth, settings.tick_rate
                );
                self.settings = Some(settings);
                self.in_game = true;
                vec![
                    Packet::ClientGameLoaded,
                    Packet::PlayerName {
                        name: self.name.clone(),
                    },
                ]
            }
            Packet::Snapshot {
                tick,
                acked_command_tick,
                ghosts,
            } => {
                self.apply_snapshot(tick, acked_command_tick, ghosts);
                Vec::new()
            }
            Packet::Disconnected { reason } => {
                warn!("Disconnected by server: {}", reason);
                self.reset();
                Vec::new()
            }
            other => {
                warn!("Unexpected packet from server: {:?}", other);
                Vec::new()
            }
        }
    }

    fn reset(&mut self) {
        self.network_id = None;
        self.in_game = false;
        self.world = World::replica();
        self.ghosts.clear();
        self.target = None;
        self.camera = None;
        self.predicted_spawns.clear();
        self.clock.reset();
        self.last_snapshot_tick = None;
        self.acked_command_tick = None;
        self.last_predicted_tick = None;
        self.replay_pending = false;
    }

    /// Applies authoritative state for `tick` and reconciles local entities.
    ///
    /// Snapshots older than the newest one applied are dropped.
    pub fn apply_snapshot(
        &mut self,
        tick: Tick,
        acked_command_tick: Option<Tick>,
        ghosts: Vec<GhostSnapshot>,
    ) {
        let Some(settings) = self.settings else {
            debug!("Snapshot {} before game config, dropping", tick);
            return;
        };
        if let Some(last) = self.last_snapshot_tick {
            if !tick.is_newer_than(last) {
                debug!("Stale snapshot {} (newest {}), dropping", tick, last);
                return;
            }
        }

        for (_, data) in self.world.iter_mut() {
            data.markers.remove(Marker::HasSnapshot);
        }

        for ghost in &ghosts {
            self.upsert_ghost(ghost, tick, &settings);
        }

        self.detect_despawned_players();
        self.remove_stale_ghosts();
        self.expire_predicted_spawns(tick);
        self.classify_players(&settings);

        self.last_snapshot_tick = Some(tick);
        self.acked_command_tick = acked_command_tick;
        self.replay_pending = true;
    }

    fn is_local(&self, owner: Option<NetworkId>) -> bool {
        owner.is_some() && owner == self.network_id
    }

    fn upsert_ghost(&mut self, ghost: &GhostSnapshot, tick: Tick, settings: &GameSettings) {
        let local = self.is_local(ghost.owner);

        let existing = self
            .ghosts
            .get(&ghost.ghost_id)
            .copied()
            .filter(|entity| self.world.contains(*entity));

        let entity = match existing {
            Some(entity) => entity,
            None => {
                let matched = if local && ghost.kind == EntityKind::Bullet {
                    self.claim_predicted_spawn(ghost.spawn_tick)
                } else {
                    None
                };
                match matched {
                    Some(entity) => {
                        debug!("Predicted bullet {:?} confirmed as ghost {}", entity, ghost.ghost_id);
                        entity
                    }
                    None => {
                        let mut data = ghost.instantiate(settings);
                        if local {
                            data = data.with_prediction(tick);
                        }
                        self.world.spawn(data)
                    }
                }
            }
        };
        self.ghosts.insert(ghost.ghost_id, entity);

        if let Some(data) = self.world.get_mut(entity) {
            ghost.apply_to(data);
            data.markers.insert(Marker::HasSnapshot);
            if let Some(prediction) = data.prediction.as_mut() {
                prediction.applied_tick = tick;
            }
        }
    }

    fn claim_predicted_spawn(&mut self, server_spawn: Tick) -> Option<Entity> {
        let index = self
            .predicted_spawns
            .iter()
            .position(|spawn| spawn.matches(server_spawn) && self.world.contains(spawn.entity))?;
        Some(self.predicted_spawns.remove(index).entity)
    }

    /// A classified player without snapshot data was removed on the server.
    fn detect_despawned_players(&mut self) {
        let gone = self.world.query(|data| {
            data.is(EntityKind::Player)
                && data.has(Marker::Classified)
                && !data.has(Marker::HasSnapshot)
        });
        for entity in gone {
            if self.target == Some(entity) {
                info!("Controlled player {:?} destroyed", entity);
                self.target = None;
            }
            for camera in self.world.query(|data| data.parent == Some(entity)) {
                self.world.despawn(camera);
                if self.camera == Some(camera) {
                    self.camera = None;
                }
            }
            self.despawn_ghost(entity);
        }
    }

    /// Ghosts missing from the snapshot were destroyed or became irrelevant.
    fn remove_stale_ghosts(&mut self) {
        let stale: Vec<Entity> = self
            .ghosts
            .values()
            .copied()
            .filter(|entity| {
                self.world
                    .get(*entity)
                    .map_or(true, |data| !data.has(Marker::HasSnapshot))
            })
            .collect();
        for entity in stale {
            self.despawn_ghost(entity);
        }
    }

    fn despawn_ghost(&mut self, entity: Entity) {
        if let Some(data) = self.world.despawn(entity) {
            if let Some(ghost_id) = data.ghost_id {
                self.ghosts.remove(&ghost_id);
            }
        }
        self.ghosts.retain(|_, mapped| *mapped != entity);
    }

    fn expire_predicted_spawns(&mut self, snapshot_tick: Tick) {
        let world = &mut self.world;
        self.predicted_spawns.retain(|spawn| {
            if spawn.is_expired(snapshot_tick) {
                debug!("Predicted bullet {:?} from {} never confirmed", spawn.entity, spawn.spawn_tick);
                world.despawn(spawn.entity);
                false
            } else {
                world.contains(spawn.entity)
            }
        });
    }

    /// Marks newly seen players and takes control of the one we own.
    fn classify_players(&mut self, settings: &GameSettings) {
        let mut queue = CommandQueue::new();
        let mut owned = None;
        for (entity, data) in self.world.iter() {
            if !data.is(EntityKind::Player) || data.has(Marker::Classified) {
                continue;
            }
            queue.mark(entity, Marker::Classified);
            if self.is_local(data.owner) {
                owned = Some(entity);
                let camera = EntityData::instantiate(EntityKind::Camera, settings, data.spawn_tick)
                    .with_parent(entity);
                queue.spawn(camera);
            }
        }
        let spawned = queue.playback(&mut self.world);
        if let Some(entity) = owned {
            info!("Now controlling {:?}", entity);
            self.target = Some(entity);
            self.camera = spawned.last().copied();
        }
    }

    /// Runs one client frame: records `action`, predicts up to the current
    /// tick and returns the packets to send to the server.
    ///
    /// After a snapshot every tick since the snapshot is replayed; otherwise
    /// only the new tick is stepped. Bullets are spawned only the first time
    /// a tick is predicted.
    pub fn advance(&mut self, action: InputAction) -> Vec<Packet> {
        let (Some(network_id), Some(settings), Some(last_snapshot)) =
            (self.network_id, self.settings, self.last_snapshot_tick)
        else {
            return Vec::new();
        };
        if !self.in_game {
            return Vec::new();
        }

        let predicted = self.clock.advance(last_snapshot);
        let mut packets = Vec::new();

        match action {
            InputAction::SpawnRequest if self.target.is_none() => {
                packets.push(Packet::PlayerSpawnRequest);
            }
            InputAction::Command(mut command) => {
                command.tick = predicted;
                if let Some(history) = self.target_history_mut() {
                    history.write(command);
                }
            }
            _ => {}
        }

        let replay_from = if self.replay_pending {
            last_snapshot
        } else {
            self.last_predicted_tick.unwrap_or(predicted.back(1))
        };
        let executor = Executor::Client { network_id };
        for tick in replay_range(replay_from, predicted) {
            let first_time = self
                .last_predicted_tick
                .map_or(true, |last| tick.is_newer_than(last));
            self.predict_tick(executor, tick, &settings, first_time);
        }
        self.replay_pending = false;
        if self
            .last_predicted_tick
            .map_or(true, |last| predicted.is_newer_than(last))
        {
            self.last_predicted_tick = Some(predicted);
        }

        if let Some(history) = self.target_history() {
            let commands = history.newest_commands(COMMANDS_PER_PACKET);
            if !commands.is_empty() {
                packets.push(Packet::Commands { commands });
            }
        }
        packets
    }

    fn predict_tick(&mut self, executor: Executor, tick: Tick, settings: &GameSettings, spawn_bullets: bool) {
        let ctx = StepContext::new(tick, settings.delta_time(), settings);

        let mut queue = simulate_controlled(&mut self.world, executor, &ctx, spawn_bullets);
        let spawned = queue.playback(&mut self.world);
        for entity in spawned {
            let Some(data) = self.world.get_mut(entity) else {
                continue;
            };
            // Moves on the tick it was fired, like its server counterpart.
            if let Some(prediction) = data.prediction.as_mut() {
                prediction.applied_tick = tick.back(1);
            }
            debug!("Predicted bullet {:?} at {}", entity, tick);
            self.predicted_spawns.push(PredictedSpawn {
                entity,
                spawn_tick: tick,
            });
        }

        integrate_all(&mut self.world, executor, &ctx);

        // Unconfirmed bullets have no authoritative state to rewind to.
        for spawn in &self.predicted_spawns {
            if let Some(prediction) = self
                .world
                .get_mut(spawn.entity)
                .and_then(|data| data.prediction.as_mut())
            {
                if tick.is_newer_than(prediction.applied_tick) {
                    prediction.applied_tick = tick;
                }
            }
        }
    }

    fn target_history(&self) -> Option<&CommandHistory> {
        self.world.get(self.target?)?.commands.as_ref()
    }

    fn target_history_mut(&mut self) -> Option<&mut CommandHistory> {
        self.world.get_mut(self.target?)?.commands.as_mut()
    }
}
