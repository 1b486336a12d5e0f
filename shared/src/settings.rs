//! Session-wide tuning shared by the server and every client.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest level edge that leaves room for asteroids inside the walls.
pub const MIN_LEVEL_SIZE: f32 = 1.0;

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("level {axis} of {size} is below the minimum of {}", MIN_LEVEL_SIZE)]
    LevelTooSmall { axis: &'static str, size: f32 },
}

/// How the relevance filter populates its per-connection set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelevancyMode {
    /// Every entity is sent to every connection.
    Disabled,
    /// The set lists (entity, connection) pairs that must NOT be sent.
    SetIsIrrelevant,
    /// The set lists (entity, connection) pairs that must be sent.
    SetIsRelevant,
}

/// Level bounds and tuning constants.
///
/// Created once at session start by the server, sent to each client in
/// `ServerGameConfig` and passed explicitly into every simulation phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameSettings {
    /// Simulation steps per second on both executors.
    pub tick_rate: u32,
    pub level_width: f32,
    pub level_height: f32,
    pub level_depth: f32,
    pub player_force: f32,
    pub bullet_velocity: f32,
    pub asteroid_velocity: f32,
    pub num_asteroids: usize,
    /// Zero disables relevance filtering.
    pub relevancy_radius: f32,
    pub relevancy_mode: RelevancyMode,
    /// Seconds a bullet lives before it is tagged for destruction.
    pub bullet_max_age: f32,
    /// Ticks between two shots of the same weapon.
    pub weapon_cooldown_ticks: u32,
    /// Muzzle position relative to the ship, in ship space.
    pub weapon_offset: Vec3,
    /// Degrees of yaw/pitch per unit of pointer delta.
    pub look_speed: f32,
    pub player_radius: f32,
    pub asteroid_radius: f32,
    pub bullet_radius: f32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            level_width: 80.0,
            level_height: 80.0,
            level_depth: 80.0,
            player_force: 50.0,
            bullet_velocity: 50.0,
            asteroid_velocity: 10.0,
            num_asteroids: 100,
            relevancy_radius: 40.0,
            relevancy_mode: RelevancyMode::SetIsIrrelevant,
            bullet_max_age: 3.0,
            weapon_cooldown_ticks: 5,
            weapon_offset: Vec3::new(0.0, 0.0, 1.5),
            look_speed: 2.0,
            player_radius: 1.0,
            asteroid_radius: 1.0,
            bullet_radius: 0.1,
        }
    }
}

impl GameSettings {
    /// Half extents of the level cube, centred on the origin.
    pub fn half_extents(&self) -> Vec3 {
        Vec3::new(self.level_width, self.level_height, self.level_depth) / 2.0
    }

    /// Returns true if `position` lies inside the level cube (inclusive).
    pub fn contains(&self, position: Vec3) -> bool {
        let half = self.half_extents();
        position.x.abs() <= half.x && position.y.abs() <= half.y && position.z.abs() <= half.z
    }

    /// Rejects level dimensions too small to place anything in.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let axes = [
            ("width", self.level_width),
            ("height", self.level_height),
            ("depth", self.level_depth),
        ];
        for (axis, size) in axes {
            // Negated so NaN is rejected too.
            if !(size >= MIN_LEVEL_SIZE) {
                return Err(SettingsError::LevelTooSmall { axis, size });
            }
        }
        Ok(())
    }

    pub fn delta_time(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    /// The relevancy mode actually in force; a zero radius always disables it.
    pub fn effective_relevancy_mode(&self) -> RelevancyMode {
        if self.relevancy_radius as i32 == 0 {
            RelevancyMode::Disabled
        } else {
            self.relevancy_mode
        }
    }
}
