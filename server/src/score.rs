//! Server-side score ledger.
//!
//! Score records are entities (so they replicate like anything else), one per
//! network id, plus a single highest-score entity. Only this module writes
//! them, and only from the trigger phase or name registration.

use crate::triggers::{OverlapState, TriggerEvent};
use log::{debug, info};
use shared::world::PlayerScoreRecord;
use shared::{Entity, EntityData, EntityKind, GameSettings, NetworkId, Tick, World};

pub const PLAYER_HIT_POINTS: i32 = 10;
pub const ASTEROID_HIT_POINTS: i32 = 1;

/// Points a bullet owned by `shooter` earns for striking `struck`.
///
/// Hitting your own player is worth nothing.
pub fn points_for_hit(shooter: NetworkId, struck: &EntityData) -> i32 {
    let mut points = 0;
    if struck.is(EntityKind::Player) {
        if struck.owner == Some(shooter) {
            return 0;
        }
        points += PLAYER_HIT_POINTS;
    }
    if struck.is(EntityKind::Asteroid) {
        points += ASTEROID_HIT_POINTS;
    }
    points
}

/// Creates the highest-score singleton. Called once at session start.
pub fn spawn_highest_score(world: &mut World, settings: &GameSettings, tick: Tick) -> Entity {
    world.spawn(EntityData::instantiate(EntityKind::HighestScore, settings, tick))
}

/// Handles a name announcement: creates the connection's score record, or
/// resets the existing one under the new name.
pub fn register_name(
    world: &mut World,
    network_id: NetworkId,
    name: &str,
    settings: &GameSettings,
    tick: Tick,
) -> Entity {
    let record = PlayerScoreRecord::new(network_id, name);

    let existing = world.query(|data| {
        data.score
            .as_ref()
            .map_or(false, |score| score.network_id == network_id)
    });
    if let Some(&entity) = existing.first() {
        if let Some(data) = world.get_mut(entity) {
            data.score = Some(record);
        }
        debug!("Score record for {} re-registered as {:?}", network_id, name);
        return entity;
    }

    info!("Player {} registered as {:?}", network_id, name);
    world.spawn(EntityData::instantiate(EntityKind::PlayerScore, settings, tick).with_score(record))
}

/// Adds `points` to the record of `network_id`, raising its high score and
/// the global highest score as needed. Unknown ids are ignored.
fn award(world: &mut World, records: &[Entity], highest: Option<Entity>, network_id: NetworkId, points: i32) {
    let mut updated = None;
    for &entity in records {
        let Some(score) = world.get_mut(entity).and_then(|data| data.score.as_mut()) else {
            continue;
        };
        if score.network_id != network_id {
            continue;
        }
        score.current_score += points;
        if score.current_score > score.high_score {
            score.high_score = score.current_score;
        }
        updated = Some((score.name.clone(), score.high_score));
    }

    let Some((name, high_score)) = updated else {
        debug!("No score record for {}; {} points dropped", network_id, points);
        return;
    };
    let Some(best) = highest
        .and_then(|entity| world.get_mut(entity))
        .and_then(|data| data.highest_score.as_mut())
    else {
        return;
    };
    if high_score > best.value {
        info!("New highest score {} by {}", high_score, name);
        best.value = high_score;
        best.name = name;
    }
}

/// Applies score changes for every bullet that entered a solid collider.
///
/// Stay and Exit records and bullet-vs-bullet pairs are ignored. Returns the
/// total number of points awarded.
pub fn apply_hits(world: &mut World, events: &[TriggerEvent]) -> i32 {
    let records = world.query(|data| data.score.is_some());
    let highest = world
        .query(|data| data.highest_score.is_some())
        .first()
        .copied();

    let mut total = 0;
    for event in events {
        if event.state != OverlapState::Enter || event.other_is_trigger {
            continue;
        }
        let Some(shooter) = world.get(event.trigger).and_then(|bullet| bullet.owner) else {
            continue;
        };
        let Some(struck) = world.get(event.other) else {
            continue;
        };
        let points = points_for_hit(shooter, struck);
        if points == 0 {
            continue;
        }
        award(world, &records, highest, shooter, points);
        total += points;
    }
    total
}

/// Resets the current score of `network_id` after its player was destroyed.
pub fn reset_current_score(world: &mut World, network_id: NetworkId) {
    for (_, data) in world.iter_mut() {
        if let Some(score) = data.score.as_mut() {
            if score.network_id == network_id {
                score.current_score = 0;
            }
        }
    }
}
