//! Keeps the asteroid field populated while anyone is connected.

use glam::Vec3;
use log::debug;
use rand::Rng;
use shared::{CommandQueue, EntityData, EntityKind, GameSettings, Marker, Tick, World};

/// Distance inside the level walls where new asteroids appear.
const FACE_PADDING: f32 = 0.1;

/// Random point on one of the six faces of the level cube.
pub fn random_face_position<R: Rng>(settings: &GameSettings, rng: &mut R) -> Vec3 {
    let half = (settings.half_extents() - Vec3::splat(FACE_PADDING)).max(Vec3::ZERO);
    let mut position = Vec3::new(
        rng.gen_range(-half.x..=half.x),
        rng.gen_range(-half.y..=half.y),
        rng.gen_range(-half.z..=half.z),
    );
    match rng.gen_range(0..6) {
        0 => position.x = -half.x,
        1 => position.x = half.x,
        2 => position.y = -half.y,
        3 => position.y = half.y,
        4 => position.z = -half.z,
        _ => position.z = half.z,
    }
    position
}

/// Random direction scaled to the configured asteroid speed.
pub fn random_velocity<R: Rng>(settings: &GameSettings, rng: &mut R) -> Vec3 {
    loop {
        let direction = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        if let Some(unit) = direction.try_normalize() {
            return unit * settings.asteroid_velocity;
        }
    }
}

/// Tops the field up to `num_asteroids`, or clears it when nobody is
/// connected. Returns how many asteroids were queued for spawning.
pub fn maintain_field<R: Rng>(
    world: &World,
    connection_count: usize,
    settings: &GameSettings,
    tick: Tick,
    rng: &mut R,
    queue: &mut CommandQueue,
) -> usize {
    if connection_count == 0 {
        let asteroids = world.query(|data| data.is(EntityKind::Asteroid));
        if !asteroids.is_empty() {
            debug!("No connections, clearing {} asteroids", asteroids.len());
        }
        for entity in asteroids {
            queue.despawn(entity);
        }
        return 0;
    }

    let existing = world.count(|data| data.is(EntityKind::Asteroid));
    let missing = settings.num_asteroids.saturating_sub(existing);
    for _ in 0..missing {
        let asteroid = EntityData::instantiate(EntityKind::Asteroid, settings, tick)
            .with_position(random_face_position(settings, rng))
            .with_velocity(random_velocity(settings, rng));
        queue.spawn(asteroid);
    }
    missing
}

/// Marks asteroids that drifted outside the level for destruction.
pub fn mark_out_of_bounds(world: &World, settings: &GameSettings, queue: &mut CommandQueue) {
    for (entity, data) in world.iter() {
        if data.is(EntityKind::Asteroid) && !settings.contains(data.transform.position) {
            queue.mark(entity, Marker::Destroy);
        }
    }
}
