//! # Asteroids Client Library
//!
//! Headless client for the multiplayer asteroids shooter. It connects to a
//! server over UDP, drives a ship from a scripted input source and keeps a
//! predicted copy of its own entities ahead of the authoritative snapshots.
//!
//! ## Architecture Overview
//!
//! ### Client-Side Prediction
//! Every frame the client records a tick-stamped command for its ship and
//! steps the ship with the same movement and weapon code the server runs.
//! Commands are sent to the server several at a time so a lost datagram does
//! not lose input.
//!
//! ### Server Reconciliation
//! When a snapshot arrives, replicated state overwrites the local copy and
//! every tick between the snapshot and the predicted tick is replayed from
//! the buffered commands. Bullets are only spawned the first time a tick is
//! predicted; replays never fire twice.
//!
//! ### Ghost Classification
//! Players seen in a snapshot are classified once. The player owned by this
//! connection becomes the command target and gets a camera entity. Bullets
//! fired locally are matched to the server's bullet ghosts by spawn tick and
//! take over their identity.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! - Snapshot application and ghost bookkeeping
//! - Player and bullet classification
//! - Re-simulation and the client tick clock
//!
//! ### Input Module (`input`)
//! - Scripted thin-client input
//! - Spawn requests while no ship is controlled
//!
//! ### Network Module (`network`)
//! - UDP socket and handshake
//! - Fixed-rate frame loop and artificial latency
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::network::Client;
//!
//! # async fn example() -> Result<(), client::network::ClientError> {
//! let mut client = Client::new("127.0.0.1:8080", "pilot", 6, 0).await?;
//! client.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod game;
pub mod input;
pub mod network;
