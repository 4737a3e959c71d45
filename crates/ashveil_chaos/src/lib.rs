//! # Ashveil Chaos
//!
//! Runtime fault injection for the Ashveil simulation server. Eight
//! scenarios behind one capability trait, owned by a [`FaultRegistry`] that
//! the control channel drives and the game loop ticks.
//!
//! ## Dispatch model
//!
//! ```text
//! control channel ──activate/deactivate──► FaultRegistry
//!                                              │
//!    game loop ── on_tick(T) ─────────────────►│ ambient faults, durations
//!                                              │
//!    zone pre-tick hook ── execute_pre_tick_faults(zone) ──► tick-scoped
//!                        (inside the zone's isolation guard)    faults
//! ```
//!
//! Tick-scoped faults run *inside* the target zone's isolation guard, so a
//! scenario that panics on purpose (cascading-zone-failure) crashes only the
//! zone it targets.

#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![deny(clippy::all)]

mod registry;
pub mod scenarios;

pub use registry::{wire_zone_hooks, ChaosError, FaultRegistry};

use ashveil_core::Zone;
use serde_json::{Map, Value};

/// Distinguishes faults dispatched inside zone tick hooks from faults whose
/// effect is process-wide.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultMode {
    /// Fires via [`FaultRegistry::execute_pre_tick_faults`] inside a zone
    /// tick, with that zone passed in.
    TickScoped,
    /// Runs once per tick from [`FaultRegistry::on_tick`] with no zone.
    Ambient,
}

impl FaultMode {
    /// Wire/telemetry string for this mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TickScoped => "tick_scoped",
            Self::Ambient => "ambient",
        }
    }
}

/// Configuration passed to [`Fault::activate`].
#[derive(Clone, Debug)]
pub struct FaultConfig {
    /// Fault-specific parameters (`delay_ms`, `megabytes`, …). Scenarios
    /// apply their documented defaults for anything missing.
    pub params: Value,
    /// Zone to target; 0 targets every zone.
    pub target_zone_id: u32,
    /// Auto-deactivate after this many ticks; 0 runs until deactivated.
    pub duration_ticks: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self { params: Value::Object(Map::new()), target_zone_id: 0, duration_ticks: 0 }
    }
}

/// Snapshot of a fault's current state, for the control channel and tests.
#[derive(Clone, Debug)]
pub struct FaultStatus {
    /// Stable scenario id, e.g. `latency-spike`.
    pub id: String,
    /// Dispatch mode.
    pub mode: FaultMode,
    /// Whether the fault is currently active.
    pub active: bool,
    /// Times this fault has ever been activated.
    pub activations: u64,
    /// Ticks since the current activation (0 when inactive; maintained by
    /// the registry).
    pub ticks_elapsed: u64,
    /// Active configuration parameters (`{}` when inactive).
    pub config: Value,
    /// Scenario-specific extras (`bytes_allocated`, `current_delay_ms`, …).
    pub detail: Value,
}

/// The capability every fault scenario implements.
///
/// Scenarios own their private state (counters, per-zone maps, allocated
/// buffers); dropping a scenario releases whatever it holds.
pub trait Fault: Send {
    /// Stable identifier used by the control protocol.
    fn id(&self) -> &'static str;

    /// Human-readable description for `list` responses.
    fn description(&self) -> &'static str;

    /// Tick-scoped or ambient.
    fn mode(&self) -> FaultMode;

    /// Arms the fault. Returns `false` if the configuration is unusable.
    fn activate(&mut self, config: &FaultConfig) -> bool;

    /// Disarms the fault and releases any held resources.
    fn deactivate(&mut self);

    /// Whether the fault is currently armed.
    fn is_active(&self) -> bool;

    /// Injects the fault's effect for one tick.
    ///
    /// `zone` is `Some` for tick-scoped dispatch and `None` for ambient
    /// dispatch. Implementations MAY panic; tick-scoped panics are absorbed
    /// by the zone's isolation guard.
    fn on_tick(&mut self, current_tick: u64, zone: Option<&mut Zone>);

    /// Snapshot for status/list responses. `ticks_elapsed` is filled in by
    /// the registry, which owns duration bookkeeping.
    fn status(&self) -> FaultStatus;
}

/// Reads a `u32` parameter, falling back to the scenario default.
pub(crate) fn param_u32(params: &Value, key: &str, default: u32) -> u32 {
    params
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(default)
}

/// Reads a `u64` parameter, falling back to the scenario default.
pub(crate) fn param_u64(params: &Value, key: &str, default: u64) -> u64 {
    params.get(key).and_then(Value::as_u64).unwrap_or(default)
}

/// Clones the params object for status snapshots; `{}` when inactive.
pub(crate) fn params_snapshot(active: bool, params: &Value) -> Value {
    if active {
        params.clone()
    } else {
        Value::Object(Map::new())
    }
}
