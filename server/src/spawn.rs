//! Two-step player spawn: accept a request, then confirm it.
//!
//! `request_spawn` validates the connection and records the new player into
//! a command queue, tagged spawn-in-progress. `complete_spawns` runs later in
//! the same tick; it hands each new player to its connection, or destroys it
//! if the connection disappeared in between.

use crate::connections::ConnectionTable;
use glam::Vec3;
use log::{debug, info};
use rand::Rng;
use shared::{
    CommandQueue, Entity, EntityData, EntityKind, GameSettings, Marker, NetworkId, Tick, World,
};

/// Fraction of the level extents players spawn within, around the centre.
const SPAWN_SPREAD: f32 = 0.2;

/// Accepts a spawn request if the connection is idle.
///
/// Duplicate requests (already controlling an entity, or a spawn already in
/// flight) are ignored, as are requests from connections not yet in game.
pub fn request_spawn<R: Rng>(
    connections: &mut ConnectionTable,
    network_id: NetworkId,
    settings: &GameSettings,
    tick: Tick,
    rng: &mut R,
    queue: &mut CommandQueue,
) -> bool {
    let Some(identity) = connections.get_mut(network_id) else {
        debug!("Spawn request from unknown connection {}", network_id);
        return false;
    };
    if !identity.can_spawn() {
        debug!(
            "Ignoring spawn request from {} (in_game={}, target={:?}, spawning={})",
            network_id, identity.in_game, identity.target, identity.spawning
        );
        return false;
    }

    let spread = Vec3::new(settings.level_width, settings.level_height, settings.level_depth) * SPAWN_SPREAD;
    let position = Vec3::new(
        rng.gen_range(-spread.x..=spread.x),
        rng.gen_range(-spread.y..=spread.y),
        rng.gen_range(-spread.z..=spread.z),
    );

    let player = EntityData::instantiate(EntityKind::Player, settings, tick)
        .with_position(position)
        .with_owner(network_id)
        .with_prediction(tick)
        .with_marker(Marker::SpawnInProgress);
    queue.spawn(player);
    identity.spawning = true;

    info!("Spawning player for connection {} at {}", network_id, position);
    true
}

/// Resolves every spawn-in-progress player.
///
/// Returns the (connection, entity) pairs whose spawn succeeded.
pub fn complete_spawns(
    world: &World,
    connections: &mut ConnectionTable,
    queue: &mut CommandQueue,
) -> Vec<(NetworkId, Entity)> {
    let mut completed = Vec::new();

    for entity in world.query(|data| data.has(Marker::SpawnInProgress)) {
        let owner = world.get(entity).and_then(|data| data.owner);
        let identity = owner.and_then(|network_id| connections.get_mut(network_id));

        match identity {
            Some(identity) if identity.is_alive() => {
                identity.target = Some(entity);
                identity.spawning = false;
                queue.unmark(entity, Marker::SpawnInProgress);
                completed.push((identity.network_id, entity));
                debug!("Connection {} now controls {:?}", identity.network_id, entity);
            }
            other => {
                if let Some(identity) = other {
                    identity.spawning = false;
                }
                info!("Destroying orphaned player {:?} (owner {:?} gone)", entity, owner);
                queue.despawn(entity);
            }
        }
    }

    completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup() -> (World, ConnectionTable, GameSettings, StdRng) {
        let mut connections = ConnectionTable::new();
        connections.insert(1);
        connections.get_mut(1).unwrap().in_game = true;
        (
            World::authoritative(),
            connections,
            GameSettings::default(),
            StdRng::seed_from_u64(7),
        )
    }

    #[test]
    fn test_request_then_complete() {
        let (mut world, mut connections, settings, mut rng) = setup();
        let mut queue = CommandQueue::new();

        assert!(request_spawn(&mut connections, 1, &settings, Tick(10), &mut rng, &mut queue));
        assert!(connections.get(1).unwrap().spawning);
        let spawned = queue.playback(&mut world);
        assert_eq!(spawned.len(), 1);

        let player = world.get(spawned[0]).unwrap();
        assert!(player.has(Marker::SpawnInProgress));
        assert_eq!(player.owner, Some(1));
        let half = Vec3::new(settings.level_width, settings.level_height, settings.level_depth) * SPAWN_SPREAD;
        assert!(player.transform.position.abs().cmple(half).all());

        let completed = complete_spawns(&world, &mut connections, &mut queue);
        queue.playback(&mut world);
        assert_eq!(completed, vec![(1, spawned[0])]);
        assert!(!world.get(spawned[0]).unwrap().has(Marker::SpawnInProgress));
        let identity = connections.get(1).unwrap();
        assert_eq!(identity.target, Some(spawned[0]));
        assert!(!identity.spawning);
    }

    #[test]
    fn test_duplicate_requests_spawn_once() {
        let (mut world, mut connections, settings, mut rng) = setup();
        let mut queue = CommandQueue::new();

        assert!(request_spawn(&mut connections, 1, &settings, Tick(10), &mut rng, &mut queue));
        assert!(!request_spawn(&mut connections, 1, &settings, Tick(10), &mut rng, &mut queue));
        queue.playback(&mut world);
        complete_spawns(&world, &mut connections, &mut queue);
        queue.playback(&mut world);

        // Controlling an entity also blocks further requests.
        assert!(!request_spawn(&mut connections, 1, &settings, Tick(11), &mut rng, &mut queue));
        assert_eq!(world.count(|data| data.is(EntityKind::Player)), 1);
    }

    #[test]
    fn test_request_before_loaded_is_ignored() {
        let (_, mut connections, settings, mut rng) = setup();
        connections.insert(2);
        let mut queue = CommandQueue::new();
        assert!(!request_spawn(&mut connections, 2, &settings, Tick(1), &mut rng, &mut queue));
        assert!(!request_spawn(&mut connections, 99, &settings, Tick(1), &mut rng, &mut queue));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_disconnect_mid_spawn_destroys_orphan() {
        let (mut world, mut connections, settings, mut rng) = setup();
        let mut queue = CommandQueue::new();

        request_spawn(&mut connections, 1, &settings, Tick(10), &mut rng, &mut queue);
        let spawned = queue.playback(&mut world);
        connections.mark_disconnected(1);

        let completed = complete_spawns(&world, &mut connections, &mut queue);
        queue.playback(&mut world);

        assert!(completed.is_empty());
        assert!(!world.contains(spawned[0]));
        assert_eq!(connections.get(1).unwrap().target, None);
    }
}
