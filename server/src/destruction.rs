//! End-of-tick destruction.
//!
//! Nothing is deleted where it is decided. Systems attach a destroy marker
//! and this pipeline, running after every other phase, removes marked
//! entities category by category so each category can clean up after itself.

use crate::connections::ConnectionTable;
use crate::score;
use log::{debug, info};
use shared::{CommandQueue, EntityKind, Marker, World};

/// How many entities of each category one destruction pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestructionReport {
    pub asteroids: usize,
    pub players: usize,
    pub bullets: usize,
    pub other: usize,
}

impl DestructionReport {
    pub fn total(&self) -> usize {
        self.asteroids + self.players + self.bullets + self.other
    }
}

/// Ages every bullet by `delta_time` and marks those past their max age.
pub fn age_bullets(world: &mut World, delta_time: f32) -> CommandQueue {
    world.par_for_each(|entity, data, queue| {
        let Some(age) = data.bullet_age.as_mut() else {
            return;
        };
        age.age += delta_time;
        if age.age > age.max_age && !data.markers.has(Marker::Destroy) {
            queue.mark(entity, Marker::Destroy);
        }
    })
}

/// Marks every player owned by a disconnected connection for destruction.
pub fn mark_disconnected_players(world: &World, connections: &ConnectionTable, queue: &mut CommandQueue) {
    let gone = connections.disconnected_ids();
    if gone.is_empty() {
        return;
    }
    for (entity, data) in world.iter() {
        if data.is(EntityKind::Player) && data.owner.map_or(false, |owner| gone.contains(&owner)) {
            queue.mark(entity, Marker::Destroy);
        }
    }
}

/// Removes every entity carrying a destroy marker.
///
/// Players first hand control back to their connection and lose their
/// current score; the high score is kept.
pub fn run_destruction(world: &mut World, connections: &mut ConnectionTable) -> DestructionReport {
    let mut report = DestructionReport::default();
    let mut queue = CommandQueue::new();

    for entity in world.query(|data| data.has(Marker::Destroy) && data.is(EntityKind::Asteroid)) {
        queue.despawn(entity);
        report.asteroids += 1;
    }

    for entity in world.query(|data| data.has(Marker::Destroy) && data.is(EntityKind::Player)) {
        let owner = world.get(entity).and_then(|data| data.owner);
        if let Some(network_id) = connections.clear_target(entity) {
            info!("Player of connection {} destroyed", network_id);
        }
        if let Some(network_id) = owner {
            score::reset_current_score(world, network_id);
        }
        queue.despawn(entity);
        report.players += 1;
    }

    for entity in world.query(|data| data.has(Marker::Destroy) && data.is(EntityKind::Bullet)) {
        queue.despawn(entity);
        report.bullets += 1;
    }

    for entity in world.query(|data| {
        data.has(Marker::Destroy)
            && !matches!(data.kind, EntityKind::Asteroid | EntityKind::Player | EntityKind::Bullet)
    }) {
        queue.despawn(entity);
        report.other += 1;
    }

    queue.playback(world);
    if report.total() > 0 {
        debug!("Destruction pass: {:?}", report);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::world::PlayerScoreRecord;
    use shared::{Entity, EntityData, GameSettings, Tick};

    fn spawn(world: &mut World, kind: EntityKind, owner: Option<u32>) -> Entity {
        let mut data = EntityData::instantiate(kind, &GameSettings::default(), Tick(1));
        data.owner = owner;
        world.spawn(data)
    }

    #[test]
    fn test_bullet_marked_after_max_age() {
        let mut world = World::authoritative();
        let bullet = spawn(&mut world, EntityKind::Bullet, Some(1));
        let max_age = world.get(bullet).unwrap().bullet_age.unwrap().max_age;

        let mut elapsed = 0.0;
        while elapsed + 0.5 <= max_age {
            age_bullets(&mut world, 0.5).playback(&mut world);
            elapsed += 0.5;
            assert!(!world.get(bullet).unwrap().has(Marker::Destroy));
        }
        age_bullets(&mut world, 0.5).playback(&mut world);
        assert!(world.get(bullet).unwrap().has(Marker::Destroy));

        // Marking is idempotent.
        assert!(age_bullets(&mut world, 0.5).is_empty());
    }

    #[test]
    fn test_player_destruction_clears_target_and_score() {
        let mut world = World::authoritative();
        let mut connections = ConnectionTable::new();
        connections.insert(1);
        let player = spawn(&mut world, EntityKind::Player, Some(1));
        connections.get_mut(1).unwrap().target = Some(player);

        let mut record = PlayerScoreRecord::new(1, "alice");
        record.current_score = 7;
        record.high_score = 12;
        let score = world.spawn(
            EntityData::instantiate(EntityKind::PlayerScore, &GameSettings::default(), Tick(1))
                .with_score(record),
        );

        world.get_mut(player).unwrap().markers.insert(Marker::Destroy);
        let report = run_destruction(&mut world, &mut connections);

        assert_eq!(report.players, 1);
        assert!(!world.contains(player));
        assert_eq!(connections.get(1).unwrap().target, None);
        let record = world.get(score).unwrap().score.clone().unwrap();
        assert_eq!((record.current_score, record.high_score), (0, 12));
    }

    #[test]
    fn test_each_category_removed_and_unmarked_kept() {
        let mut world = World::authoritative();
        let mut connections = ConnectionTable::new();
        let kinds = [EntityKind::Asteroid, EntityKind::Bullet, EntityKind::Player];
        let marked: Vec<Entity> = kinds.iter().map(|&kind| spawn(&mut world, kind, None)).collect();
        let kept = spawn(&mut world, EntityKind::Asteroid, None);
        for &entity in &marked {
            world.get_mut(entity).unwrap().markers.insert(Marker::Destroy);
        }

        let report = run_destruction(&mut world, &mut connections);
        assert_eq!((report.asteroids, report.bullets, report.players), (1, 1, 1));
        assert_eq!(world.len(), 1);
        assert!(world.contains(kept));
        assert_eq!(world.count(|data| data.has(Marker::Destroy)), 0);
    }

    #[test]
    fn test_disconnected_players_marked() {
        let mut world = World::authoritative();
        let mut connections = ConnectionTable::new();
        connections.insert(1);
        connections.insert(2);
        let staying = spawn(&mut world, EntityKind::Player, Some(1));
        let leaving = spawn(&mut world, EntityKind::Player, Some(2));
        let bullet = spawn(&mut world, EntityKind::Bullet, Some(2));
        connections.mark_disconnected(2);

        let mut queue = CommandQueue::new();
        mark_disconnected_players(&world, &connections, &mut queue);
        queue.playback(&mut world);

        assert!(!world.get(staying).unwrap().has(Marker::Destroy));
        assert!(world.get(leaving).unwrap().has(Marker::Destroy));
        assert!(!world.get(bullet).unwrap().has(Marker::Destroy));
    }
}
