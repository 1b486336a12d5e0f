//! Distance-based replication filter.

use crate::connections::ConnectionTable;
use glam::Vec3;
use rayon::prelude::*;
use shared::{GameSettings, GhostId, NetworkId, RelevancyMode, World};
use std::collections::HashSet;

/// Where a connection is considered to be before it controls anything.
pub const DEFAULT_REFERENCE_POSITION: Vec3 = Vec3::new(0.0, 1.0, -10.0);

/// Per-tick (ghost, connection) set, interpreted according to its mode.
#[derive(Debug, Clone)]
pub struct RelevanceSet {
    mode: RelevancyMode,
    pairs: HashSet<(GhostId, NetworkId)>,
}

impl RelevanceSet {
    /// A set that lets everything through.
    pub fn disabled() -> Self {
        Self {
            mode: RelevancyMode::Disabled,
            pairs: HashSet::new(),
        }
    }

    pub fn mode(&self) -> RelevancyMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Whether `ghost` goes into `connection`'s snapshot this tick.
    pub fn is_relevant(&self, ghost: GhostId, connection: NetworkId) -> bool {
        match self.mode {
            RelevancyMode::Disabled => true,
            RelevancyMode::SetIsIrrelevant => !self.pairs.contains(&(ghost, connection)),
            RelevancyMode::SetIsRelevant => self.pairs.contains(&(ghost, connection)),
        }
    }
}

/// Reference position of every live connection: its controlled entity, or
/// the default camera position when it controls nothing.
pub fn reference_positions(world: &World, connections: &ConnectionTable) -> Vec<(NetworkId, Vec3)> {
    connections
        .iter()
        .filter(|identity| identity.is_alive())
        .map(|identity| {
            let position = identity
                .target
                .and_then(|entity| world.get(entity))
                .map_or(DEFAULT_REFERENCE_POSITION, |data| data.transform.position);
            (identity.network_id, position)
        })
        .collect()
}

/// Builds this tick's relevance set.
///
/// Score and highest-score entities are relevant to everyone at any radius.
pub fn compute_relevance(world: &World, connections: &ConnectionTable, settings: &GameSettings) -> RelevanceSet {
    let mode = settings.effective_relevancy_mode();
    if mode == RelevancyMode::Disabled {
        return RelevanceSet::disabled();
    }

    let references = reference_positions(world, connections);
    let radius = settings.relevancy_radius;
    let want_far = mode == RelevancyMode::SetIsIrrelevant;

    let pairs = world
        .par_iter()
        .filter_map(|(_, data)| data.ghost_id.map(|ghost| (ghost, data)))
        .flat_map_iter(|(ghost, data)| {
            let exempt = data.kind.is_always_relevant();
            let position = data.transform.position;
            references.iter().filter_map(move |&(connection, reference)| {
                let far = position.distance(reference) > radius;
                let listed = if want_far {
                    far && !exempt
                } else {
                    !far || exempt
                };
                listed.then_some((ghost, connection))
            })
        })
        .collect();

    RelevanceSet { mode, pairs }
}
