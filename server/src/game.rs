//! Authoritative per-tick phase runner.
//!
//! `ServerGame` owns the world, the connection table and every piece of
//! session state. The network layer feeds it packets with [`ServerGame::receive`]
//! and calls [`ServerGame::tick`] at the fixed rate; each tick runs the phases
//! below in strict order, with deferred structural changes played back at the
//! end of each phase:
//!
//! 1. drain received packets (names, loads, spawn requests, commands)
//! 2. asteroid field upkeep
//! 3. movement and weapon step for every controlled entity
//! 4. integration
//! 5. bullet aging, out-of-bounds asteroids, disconnected players
//! 6. trigger events, score ledger, hit effects
//! 7. spawn completion
//! 8. relevance
//! 9. destruction, then removal of disconnected identities
//! 10. config and snapshots for each connection

use crate::asteroids;
use crate::connections::ConnectionTable;
use crate::destruction::{self, DestructionReport};
use crate::relevance::{self, RelevanceSet};
use crate::score;
use crate::spawn;
use crate::triggers::{self, TriggerTracker};
use glam::Vec3;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::protocol::clamp_name;
use shared::simulation::{integrate_all, simulate_controlled};
use shared::{
    encoded_size, CommandQueue, Entity, Executor, GameSettings, GhostSnapshot, NetworkId, Packet,
    StepContext, Tick, TickClock, World, MAX_PACKET_SIZE,
};

/// Packet addressed to one connection.
pub type Outgoing = (NetworkId, Packet);

pub struct ServerGame {
    settings: GameSettings,
    clock: TickClock,
    world: World,
    connections: ConnectionTable,
    triggers: TriggerTracker,
    rng: StdRng,
    inbox: Vec<(NetworkId, Packet)>,
    highest_score: Entity,
    relevance: RelevanceSet,
    last_destruction: DestructionReport,
}

impl ServerGame {
    pub fn new(settings: GameSettings) -> Self {
        let clock = TickClock::new(settings.tick_rate);
        Self::with_rng(settings, clock, StdRng::from_entropy())
    }

    /// Deterministic game for tests and benchmarks.
    pub fn with_seed(settings: GameSettings, clock: TickClock, seed: u64) -> Self {
        Self::with_rng(settings, clock, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: GameSettings, clock: TickClock, rng: StdRng) -> Self {
        let mut world = World::authoritative();
        let highest_score = score::spawn_highest_score(&mut world, &settings, clock.tick());
        Self {
            settings,
            clock,
            world,
            connections: ConnectionTable::new(),
            triggers: TriggerTracker::new(),
            rng,
            inbox: Vec::new(),
            highest_score,
            relevance: RelevanceSet::disabled(),
            last_destruction: DestructionReport::default(),
        }
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn tick_number(&self) -> Tick {
        self.clock.tick()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    pub fn connections_mut(&mut self) -> &mut ConnectionTable {
        &mut self.connections
    }

    pub fn relevance(&self) -> &RelevanceSet {
        &self.relevance
    }

    pub fn highest_score_entity(&self) -> Entity {
        self.highest_score
    }

    pub fn last_destruction(&self) -> DestructionReport {
        self.last_destruction
    }

    /// Registers a new connection. Returns false if the id is already known.
    pub fn connect(&mut self, network_id: NetworkId) -> bool {
        let added = self.connections.insert(network_id);
        if added {
            info!("Connection {} joined", network_id);
        }
        added
    }

    /// Flags a connection as gone. Its entities are cleaned up next tick.
    pub fn disconnect(&mut self, network_id: NetworkId) {
        self.connections.mark_disconnected(network_id);
    }

    /// Queues a packet from `network_id` for the next tick.
    pub fn receive(&mut self, network_id: NetworkId, packet: Packet) {
        self.inbox.push((network_id, packet));
    }

    fn handle_packet(&mut self, network_id: NetworkId, packet: Packet, spawns: &mut CommandQueue) {
        let tick = self.clock.tick();
        match packet {
            Packet::ClientGameLoaded => match self.connections.get_mut(network_id) {
                Some(identity) if identity.is_alive() => {
                    if !identity.in_game {
                        info!("Connection {} is in game", network_id);
                    }
                    identity.in_game = true;
                }
                _ => debug!("Game loaded from unknown connection {}", network_id),
            },
            Packet::PlayerSpawnRequest => {
                spawn::request_spawn(
                    &mut self.connections,
                    network_id,
                    &self.settings,
                    tick,
                    &mut self.rng,
                    spawns,
                );
            }
            Packet::PlayerName { name } => {
                if !self.connections.is_alive(network_id) {
                    debug!("Name from unknown connection {}", network_id);
                    return;
                }
                let name = clamp_name(&name);
                score::register_name(&mut self.world, network_id, &name, &self.settings, tick);
            }
            Packet::Commands { commands } => {
                let target = self
                    .connections
                    .get(network_id)
                    .filter(|identity| identity.is_alive())
                    .and_then(|identity| identity.target);
                let history = target
                    .and_then(|entity| self.world.get_mut(entity))
                    .and_then(|data| data.commands.as_mut());
                match history {
                    Some(history) => {
                        for command in commands {
                            history.write(command);
                        }
                    }
                    None => debug!("Dropping commands from {} (no target)", network_id),
                }
            }
            Packet::Disconnect => self.disconnect(network_id),
            other => warn!("Unexpected packet from connection {}: {:?}", network_id, other),
        }
    }

    /// Runs one authoritative tick and returns the packets to send.
    pub fn tick(&mut self) -> Vec<Outgoing> {
        let tick = self.clock.advance();
        let settings = self.settings;
        let ctx = StepContext::new(tick, self.clock.delta_time(), &settings);

        let mut queue = CommandQueue::new();
        for (network_id, packet) in std::mem::take(&mut self.inbox) {
            self.handle_packet(network_id, packet, &mut queue);
        }
        queue.playback(&mut self.world);

        let live_connections = self.connections.iter().filter(|identity| identity.is_alive()).count();
        asteroids::maintain_field(
            &self.world,
            live_connections,
            &settings,
            tick,
            &mut self.rng,
            &mut queue,
        );
        queue.playback(&mut self.world);

        simulate_controlled(&mut self.world, Executor::Server, &ctx, true).playback(&mut self.world);
        integrate_all(&mut self.world, Executor::Server, &ctx);

        let mut queue = destruction::age_bullets(&mut self.world, ctx.delta_time);
        asteroids::mark_out_of_bounds(&self.world, &settings, &mut queue);
        destruction::mark_disconnected_players(&self.world, &self.connections, &mut queue);
        queue.playback(&mut self.world);

        let events = self.triggers.update(&self.world, &settings);
        score::apply_hits(&mut self.world, &events);
        triggers::apply_hit_effects(&events, &mut queue);
        queue.playback(&mut self.world);

        spawn::complete_spawns(&self.world, &mut self.connections, &mut queue);
        queue.playback(&mut self.world);

        self.relevance = relevance::compute_relevance(&self.world, &self.connections, &settings);

        self.last_destruction = destruction::run_destruction(&mut self.world, &mut self.connections);
        self.connections.remove_disconnected();

        let outgoing = self.outgoing_packets(tick);

        if tick.0 % 60 == 0 {
            debug!(
                "Tick {}: {} connections, {} entities, {} relevance pairs",
                tick,
                self.connections.len(),
                self.world.len(),
                self.relevance.len()
            );
        }
        outgoing
    }

    fn outgoing_packets(&mut self, tick: Tick) -> Vec<Outgoing> {
        let mut outgoing = Vec::new();

        for identity in self.connections.awaiting_config() {
            identity.config_sent = true;
            outgoing.push((identity.network_id, Packet::ServerGameConfig(self.settings)));
        }

        for identity in self.connections.in_game() {
            let network_id = identity.network_id;
            let acked_command_tick = identity
                .target
                .and_then(|entity| self.world.get(entity))
                .and_then(|data| data.commands.as_ref())
                .and_then(|history| history.latest_at(tick))
                .map(|command| command.tick);

            let viewer = identity
                .target
                .and_then(|entity| self.world.get(entity))
                .map(|data| data.transform.position)
                .unwrap_or(Vec3::ZERO);

            let mut ranked: Vec<(f32, GhostSnapshot)> = self
                .world
                .iter()
                .filter_map(|(_, data)| GhostSnapshot::capture(data))
                .filter(|ghost| self.relevance.is_relevant(ghost.ghost_id, network_id))
                .map(|ghost| (snapshot_priority(&ghost, network_id, viewer), ghost))
                .collect();
            ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

            let ghosts = fit_ghosts(tick, acked_command_tick, ranked.into_iter().map(|(_, ghost)| ghost));
            outgoing.push((
                network_id,
                Packet::Snapshot {
                    tick,
                    acked_command_tick,
                    ghosts,
                },
            ));
        }
        outgoing
    }
}

/// Sort key for snapshot ordering. Score records and the connection's own
/// entities come first, everything else nearest the viewer first.
fn snapshot_priority(ghost: &GhostSnapshot, network_id: NetworkId, viewer: Vec3) -> f32 {
    if ghost.score.is_some() || ghost.highest_score.is_some() || ghost.owner == Some(network_id) {
        return -1.0;
    }
    ghost.position.distance_squared(viewer)
}

/// Takes ghosts in order until the snapshot would outgrow one datagram.
fn fit_ghosts(
    tick: Tick,
    acked_command_tick: Option<Tick>,
    ghosts: impl Iterator<Item = GhostSnapshot>,
) -> Vec<GhostSnapshot> {
    let empty = Packet::Snapshot {
        tick,
        acked_command_tick,
        ghosts: Vec::new(),
    };
    let mut size = match encoded_size(&empty) {
        Ok(size) => size,
        Err(e) => {
            warn!("Cannot size snapshot header: {}", e);
            return Vec::new();
        }
    };

    let mut fitted = Vec::new();
    let mut dropped = 0;
    for ghost in ghosts {
        match encoded_size(&ghost) {
            Ok(ghost_size) if size + ghost_size <= MAX_PACKET_SIZE => {
                size += ghost_size;
                fitted.push(ghost);
            }
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!("Snapshot for tick {} full, {} ghosts held back", tick, dropped);
    }
    fitted
}
