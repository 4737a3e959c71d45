//! # Ashveil Net
//!
//! The network edge of the Ashveil server: a game socket that turns
//! newline-delimited JSON into [`ashveil_core::GameEvent`]s, and a control
//! socket that drives the fault registry.
//!
//! ## Thread model
//!
//! Each listener runs an accept loop on its own thread; each accepted
//! connection gets a reader thread. Readers never touch simulation state:
//! they push parsed values into [`ashveil_core::DrainQueue`]s that the
//! simulation thread drains at tick start. Control responses travel back
//! through a per-connection channel to a writer thread, so response I/O
//! happens off the simulation thread too.

#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![deny(clippy::all)]

pub mod control;
pub mod game_server;
pub mod parser;
pub mod seed;

pub use control::{
    execute_command, process_pending_commands, CommandQueue, ControlChannel,
    ControlChannelConfig, ControlCommand,
};
pub use game_server::{GameServer, GameServerConfig};
pub use parser::{parse_event, ParseError};
pub use seed::{apply_seeds, default_seeds, NpcSeed, ZoneSeed};

use thiserror::Error;

/// Unrecoverable network-edge failures: surfaced to the caller of `start`,
/// which terminates before the tick loop begins.
#[derive(Error, Debug)]
pub enum NetError {
    /// The listener socket could not be bound.
    #[error("failed to bind port {port}: {source}")]
    Bind {
        /// Requested port (0 = OS-assigned).
        port: u16,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The accept-loop thread could not be spawned.
    #[error("failed to spawn network thread: {0}")]
    Spawn(#[from] std::io::Error),
}
