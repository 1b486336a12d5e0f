//! # Game Server Library
//!
//! Authoritative server for the asteroids shooter. It owns the canonical
//! world, executes every player's tick-stamped commands, and replicates the
//! result back to each connection as relevance-filtered snapshots.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server runs the definitive movement and weapon step for every
//! controlled entity, using exactly the same code clients use for
//! prediction (see `shared::simulation`). A command missing for a tick is
//! treated as neutral input.
//!
//! ### Connection Lifecycle
//! Each connection gets a network identity: it loads the level, announces a
//! name, requests a player, controls it, loses it, requests another. A
//! disconnect is only a flag; the next tick's passes observe it and clean up
//! the connection's entities through the normal destruction path.
//!
//! ### Replication
//! After every tick each in-game connection receives a snapshot of the
//! ghosts relevant to it, along with the newest of its commands the server
//! has seen.
//!
//! ## Module Organization
//!
//! - `client_manager`: socket address to network id mapping and timeouts
//! - `connections`: per-connection simulation state (target, spawning, in game)
//! - `spawn`: spawn request and completion
//! - `score`: score ledger and highest-score singleton
//! - `triggers`: stateful bullet trigger events and the hit effect
//! - `relevance`: distance-based replication filter
//! - `asteroids`: asteroid field upkeep
//! - `destruction`: bullet aging and the end-of-tick destruction passes
//! - `game`: the per-tick phase runner
//! - `network`: UDP transport and the main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::GameSettings;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 60Hz simulation, at most 16 clients
//!     let mut server = Server::new("127.0.0.1:8080", GameSettings::default(), 16).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod asteroids;
pub mod client_manager;
pub mod connections;
pub mod destruction;
pub mod game;
pub mod network;
pub mod relevance;
pub mod score;
pub mod spawn;
pub mod triggers;
