//! Stateful trigger events for bullets.
//!
//! Every bullet is a spherical trigger volume. Each tick the tracker computes
//! which colliders overlap each bullet and diffs that against the previous
//! tick, producing Enter, Stay and Exit records. Collision detection proper
//! is deliberately simple (sphere vs sphere).

use glam::Vec3;
use rayon::prelude::*;
use shared::{CommandQueue, Entity, EntityKind, GameSettings, Marker, World};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapState {
    Enter,
    Stay,
    Exit,
}

/// One overlap transition seen from a trigger volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    pub trigger: Entity,
    pub other: Entity,
    /// Whether `other` is itself a trigger volume (bullet vs bullet).
    pub other_is_trigger: bool,
    pub state: OverlapState,
}

#[derive(Debug, Clone, Copy)]
struct Collider {
    entity: Entity,
    position: Vec3,
    radius: f32,
    is_trigger: bool,
}

fn collider_radius(kind: EntityKind, settings: &GameSettings) -> Option<f32> {
    match kind {
        EntityKind::Player => Some(settings.player_radius),
        EntityKind::Asteroid => Some(settings.asteroid_radius),
        EntityKind::Bullet => Some(settings.bullet_radius),
        _ => None,
    }
}

/// Remembers last tick's overlaps per trigger volume.
#[derive(Debug, Default)]
pub struct TriggerTracker {
    previous: HashMap<Entity, BTreeMap<Entity, bool>>,
}

impl TriggerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes this tick's overlap transitions, grouped by trigger entity.
    pub fn update(&mut self, world: &World, settings: &GameSettings) -> Vec<TriggerEvent> {
        let colliders: Vec<Collider> = world
            .iter()
            .filter_map(|(entity, data)| {
                collider_radius(data.kind, settings).map(|radius| Collider {
                    entity,
                    position: data.transform.position,
                    radius,
                    is_trigger: data.kind.is_trigger(),
                })
            })
            .collect();

        let current: Vec<(Entity, BTreeMap<Entity, bool>)> = colliders
            .par_iter()
            .filter(|collider| collider.is_trigger)
            .map(|trigger| {
                let overlaps = colliders
                    .iter()
                    .filter(|other| other.entity != trigger.entity)
                    .filter(|other| {
                        trigger.position.distance(other.position) <= trigger.radius + other.radius
                    })
                    .map(|other| (other.entity, other.is_trigger))
                    .collect();
                (trigger.entity, overlaps)
            })
            .collect();

        let mut events = Vec::new();
        let mut next = HashMap::with_capacity(current.len());
        for (trigger, overlaps) in current {
            let before = self.previous.remove(&trigger).unwrap_or_default();
            for (&other, &other_is_trigger) in &overlaps {
                let state = if before.contains_key(&other) {
                    OverlapState::Stay
                } else {
                    OverlapState::Enter
                };
                events.push(TriggerEvent {
                    trigger,
                    other,
                    other_is_trigger,
                    state,
                });
            }
            for (&other, &other_is_trigger) in &before {
                if !overlaps.contains_key(&other) {
                    events.push(TriggerEvent {
                        trigger,
                        other,
                        other_is_trigger,
                        state: OverlapState::Exit,
                    });
                }
            }
            next.insert(trigger, overlaps);
        }
        // Triggers that no longer exist drop their state without events.
        self.previous = next;
        events
    }
}

/// A solid collider leaving a bullet's volume is marked for destruction.
pub fn apply_hit_effects(events: &[TriggerEvent], queue: &mut CommandQueue) {
    for event in events {
        if event.state == OverlapState::Exit && !event.other_is_trigger {
            queue.mark(event.other, Marker::Destroy);
        }
    }
}
