//! Player commands and the per-entity, tick-keyed command history.

use crate::tick::Tick;
use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Number of ticks of input retained per controlled entity.
///
/// At 60Hz this covers a round trip of just over one second.
pub const COMMAND_HISTORY_CAPACITY: usize = 64;

/// Absolute pose carried by pose-driven input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

/// Input captured for a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerCommand {
    pub tick: Tick,
    /// Bitmask of the button constants below.
    pub buttons: u8,
    /// Pointer-look delta (x = yaw, y = pitch). Zero means no look input.
    pub look: Vec2,
    /// When set, the entity is placed at this pose instead of thrusting.
    pub pose: Option<Pose>,
}

impl PlayerCommand {
    pub const RIGHT: u8 = 1 << 0;
    pub const LEFT: u8 = 1 << 1;
    pub const THRUST: u8 = 1 << 2;
    pub const REVERSE_THRUST: u8 = 1 << 3;
    pub const SELF_DESTRUCT: u8 = 1 << 4;
    pub const SHOOT: u8 = 1 << 5;

    pub fn new(tick: Tick, buttons: u8) -> Self {
        Self {
            tick,
            buttons,
            ..Default::default()
        }
    }

    /// A command with no input at all for `tick`.
    pub fn neutral(tick: Tick) -> Self {
        Self::new(tick, 0)
    }

    pub fn with_look(mut self, dx: f32, dy: f32) -> Self {
        self.look = Vec2::new(dx, dy);
        self
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = Some(pose);
        self
    }

    pub fn is_pressed(&self, button: u8) -> bool {
        self.buttons & button != 0
    }
}

/// Bounded ring of commands indexed by tick.
///
/// Only the newest [`COMMAND_HISTORY_CAPACITY`] ticks are retained. Lookups
/// outside that window report "not found" and never return stale entries
/// that happen to share a ring slot.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    slots: Vec<Option<PlayerCommand>>,
    newest: Option<Tick>,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self {
            slots: vec![None; COMMAND_HISTORY_CAPACITY],
            newest: None,
        }
    }

    fn slot_index(tick: Tick) -> usize {
        tick.0 as usize % COMMAND_HISTORY_CAPACITY
    }

    fn in_window(&self, tick: Tick) -> bool {
        match self.newest {
            Some(newest) => {
                let age = newest.ticks_since(tick);
                (0..COMMAND_HISTORY_CAPACITY as i32).contains(&age)
            }
            None => false,
        }
    }

    /// Stores `command` at its tick, replacing any entry already recorded there.
    ///
    /// Returns false if the tick is already older than the retained window.
    pub fn write(&mut self, command: PlayerCommand) -> bool {
        let tick = command.tick;
        match self.newest {
            Some(newest) if newest.ticks_since(tick) >= COMMAND_HISTORY_CAPACITY as i32 => {
                return false;
            }
            Some(newest) if !tick.is_newer_than(newest) => {}
            _ => self.newest = Some(tick),
        }
        self.slots[Self::slot_index(tick)] = Some(command);
        true
    }

    /// Returns the command recorded for exactly `tick`, if still retained.
    pub fn get(&self, tick: Tick) -> Option<&PlayerCommand> {
        if !self.in_window(tick) {
            return None;
        }
        self.slots[Self::slot_index(tick)]
            .as_ref()
            .filter(|command| command.tick == tick)
    }

    /// Returns the command for `tick` and whether it was found.
    ///
    /// A miss yields a neutral command for that tick; callers treat it as
    /// "no input this tick".
    pub fn read(&self, tick: Tick) -> (PlayerCommand, bool) {
        match self.get(tick) {
            Some(command) => (*command, true),
            None => (PlayerCommand::neutral(tick), false),
        }
    }

    /// Returns the newest retained command whose tick is not after `tick`.
    pub fn latest_at(&self, tick: Tick) -> Option<&PlayerCommand> {
        self.slots
            .iter()
            .flatten()
            .filter(|command| self.in_window(command.tick) && tick.is_at_or_after(command.tick))
            .min_by_key(|command| tick.ticks_since(command.tick))
    }

    /// Returns up to `count` of the newest retained commands, oldest first.
    pub fn newest_commands(&self, count: usize) -> Vec<PlayerCommand> {
        let Some(newest) = self.newest else {
            return Vec::new();
        };
        let mut commands: Vec<PlayerCommand> = (0..count.min(COMMAND_HISTORY_CAPACITY) as u32)
            .filter_map(|age| self.get(newest.back(age)).copied())
            .collect();
        commands.reverse();
        commands
    }

    pub fn newest_tick(&self) -> Option<Tick> {
        self.newest
    }

    /// Number of commands currently inside the retained window.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|command| self.in_window(command.tick))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new()
    }
}
