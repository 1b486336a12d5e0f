//! Simulation core shared by the server and the client: ticks, commands,
//! settings, the entity arena, the movement/weapon step, the prediction rule
//! and the wire protocol.

pub mod codec;
pub mod command;
pub mod prediction;
pub mod protocol;
pub mod settings;
pub mod simulation;
pub mod tick;
pub mod world;

pub use codec::{decode, encode, encoded_size, CodecError, MAX_PACKET_SIZE};
pub use command::{CommandHistory, PlayerCommand, Pose, COMMAND_HISTORY_CAPACITY};
pub use prediction::Executor;
pub use protocol::{GhostSnapshot, Packet, PROTOCOL_VERSION};
pub use settings::{GameSettings, RelevancyMode, SettingsError, MIN_LEVEL_SIZE};
pub use simulation::StepContext;
pub use tick::{Tick, TickClock};
pub use world::{
    CommandQueue, Entity, EntityData, EntityKind, GhostId, Marker, NetworkId, World,
};
