//! Who re-simulates what.
//!
//! The server steps every controlled entity every tick. A client only
//! re-simulates entities it owns that carry a prediction marker, and only
//! for ticks after the last authoritative state it received. Ghosts owned by
//! anyone else are displayed straight from snapshots.

use crate::command::COMMAND_HISTORY_CAPACITY;
use crate::tick::Tick;
use crate::world::{EntityData, NetworkId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executor {
    Server,
    Client { network_id: NetworkId },
}

impl Executor {
    /// Decides whether `data` should be stepped for `tick` by this executor.
    pub fn should_predict(&self, data: &EntityData, tick: Tick) -> bool {
        match *self {
            Executor::Server => true,
            Executor::Client { network_id } => {
                let Some(prediction) = data.prediction else {
                    return false;
                };
                if data.owner != Some(network_id) {
                    return false;
                }
                let since = tick.ticks_since(prediction.applied_tick);
                since > 0 && since <= COMMAND_HISTORY_CAPACITY as i32
            }
        }
    }
}

/// Ticks a client must replay after receiving authoritative state for
/// `applied`, to catch up with `predicted`. Empty when nothing is pending.
pub fn replay_range(applied: Tick, predicted: Tick) -> impl Iterator<Item = Tick> {
    let count = predicted.ticks_since(applied).clamp(0, COMMAND_HISTORY_CAPACITY as i32) as u32;
    (1..=count).map(move |step| applied.offset(step))
}
