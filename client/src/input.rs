//! Scripted thin-client input

use shared::{PlayerCommand, Tick};
use std::time::{Duration, Instant};

/// Seconds per leg of the scripted left/thrust cycle.
const CYCLE_SECONDS: u64 = 3;

/// Frames between two scripted shots.
pub const SHOOT_INTERVAL_FRAMES: u32 = 100;

/// What the input source wants to do this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputAction {
    /// Steer the controlled entity. The tick is filled in by the game.
    Command(PlayerCommand),
    /// No controlled entity yet and the player pressed fire.
    SpawnRequest,
    Idle,
}

/// Drives a ship without a human: turns left for one second out of every
/// three, thrusts otherwise, and fires every [`SHOOT_INTERVAL_FRAMES`] frames.
pub struct InputManager {
    started: Instant,
    frame_count: u32,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            frame_count: 0,
        }
    }

    /// Samples input for the current frame.
    pub fn update(&mut self, has_target: bool) -> InputAction {
        self.sample(self.started.elapsed(), has_target)
    }

    pub fn sample(&mut self, elapsed: Duration, has_target: bool) -> InputAction {
        let mut buttons = if elapsed.as_secs() % CYCLE_SECONDS == 0 {
            PlayerCommand::LEFT
        } else {
            PlayerCommand::THRUST
        };

        self.frame_count += 1;
        let shoot = self.frame_count % SHOOT_INTERVAL_FRAMES == 0;
        if shoot {
            self.frame_count = 0;
            buttons |= PlayerCommand::SHOOT;
        }

        if !has_target {
            return if shoot {
                InputAction::SpawnRequest
            } else {
                InputAction::Idle
            };
        }
        InputAction::Command(PlayerCommand::new(Tick::ZERO, buttons))
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
