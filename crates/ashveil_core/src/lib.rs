//! # Ashveil Core
//!
//! The simulation heart of the Ashveil world server: zones, the three-phase
//! tick pipeline, the session lifecycle, and the fixed-rate driver.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      SIMULATION THREAD                         │
//! ├────────────────────────────────────────────────────────────────┤
//! │  GameLoop (20Hz) ──► drain sessions ──► drain commands         │
//! │        │                                                       │
//! │        └──► ZoneManager::tick_all                              │
//! │               │                                                │
//! │               ▼  per zone, inside the isolation guard:         │
//! │        pre-tick hook ─► drain queue ─► Movement ─► SpellCast   │
//! │                                          ─► Combat ─► post hook│
//! └────────────────────────────────────────────────────────────────┘
//!           ▲ DrainQueue pushes only — the single synchronization
//! ┌─────────┴──────────────────────────────────────────────────────┐
//! │  NETWORK THREADS: accept loops + per-connection readers        │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design rules
//!
//! - All game state is owned by the simulation thread. The only shared
//!   structures are [`DrainQueue`]s and the telemetry sinks.
//! - Zone failures never escape the zone: [`Zone::tick`] wraps the pipeline
//!   in a panic guard and converts failures into the
//!   Crashed → Degraded → Active recovery arc.
//! - Entity maps are ordered (`BTreeMap`), so every "first entity" or
//!   tie-break decision is deterministic: smallest id wins.

#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![deny(clippy::all)]

pub mod events;
pub mod game_loop;
pub mod pipeline;
pub mod queue;
pub mod session;
pub mod telemetry;
pub mod world;

pub use events::{CombatAction, DamageType, GameEvent, SpellAction};
pub use game_loop::{GameLoop, GameLoopConfig, LoopError};
pub use pipeline::{CombatProcessor, CombatResult, MovementProcessor, SpellCastProcessor, SpellCastResult};
pub use queue::DrainQueue;
pub use session::{Session, SessionEvent, SessionNotification, SessionNotificationKind, SessionState};
pub use telemetry::{MemoryBuffer, Telemetry, TelemetryConfig, TelemetryError};
pub use world::{
    CastState, CombatState, Entity, EntityKind, Position, WorldError, Zone, ZoneConfig,
    ZoneHealth, ZoneId, ZoneManager, ZoneManagerTickResult, ZoneState, ZoneTickResult, NO_ZONE,
};

/// Default simulation tick rate in Hz (50 ms per tick).
pub const DEFAULT_TICK_RATE_HZ: f64 = 20.0;

/// Global cooldown after any cast initiation: 1.5 s at 20 Hz.
pub const GLOBAL_COOLDOWN_TICKS: u32 = 30;

/// Maximum damage mitigation from armor or resistance (75%).
pub const MAX_MITIGATION: f32 = 0.75;

/// Default starting health for entities.
pub const DEFAULT_HEALTH: i32 = 100;

/// Default maximum health for entities.
pub const DEFAULT_MAX_HEALTH: i32 = 100;
