//! Cascading zone failure: crash one zone, then keep flooding another —
//! the classic correlated-failure drill.

use ashveil_core::{Telemetry, Zone};
use serde_json::json;

use crate::scenarios::flood_zone;
use crate::{param_u32, params_snapshot, Fault, FaultConfig, FaultMode, FaultStatus};

const DEFAULT_SOURCE_ZONE: u32 = 1;
const DEFAULT_TARGET_ZONE: u32 = 2;
const DEFAULT_FLOOD_MULTIPLIER: u32 = 10;

/// Two-phase scenario.
///
/// Phase A: the first dispatch into the source zone records the crash and
/// panics, which the zone's isolation guard converts into a Crashed state.
/// Phase B: every subsequent dispatch into the target zone floods its queue,
/// modeling displaced load landing on a neighbor.
pub struct CascadingZoneFailureFault {
    active: bool,
    params: serde_json::Value,
    activations: u64,
    source_zone: u32,
    target_zone: u32,
    flood_multiplier: u32,
    fired_crash: bool,
    source_crashed: bool,
    telemetry: Telemetry,
}

impl CascadingZoneFailureFault {
    /// Creates the scenario, inactive.
    #[must_use]
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            active: false,
            params: json!({}),
            activations: 0,
            source_zone: DEFAULT_SOURCE_ZONE,
            target_zone: DEFAULT_TARGET_ZONE,
            flood_multiplier: DEFAULT_FLOOD_MULTIPLIER,
            fired_crash: false,
            source_crashed: false,
            telemetry,
        }
    }
}

impl Fault for CascadingZoneFailureFault {
    fn id(&self) -> &'static str {
        "cascading-zone-failure"
    }

    fn description(&self) -> &'static str {
        "Crash a source zone, then flood a target zone with events"
    }

    fn mode(&self) -> FaultMode {
        FaultMode::TickScoped
    }

    fn activate(&mut self, config: &FaultConfig) -> bool {
        self.source_zone = param_u32(&config.params, "source_zone", DEFAULT_SOURCE_ZONE);
        self.target_zone = param_u32(&config.params, "target_zone", DEFAULT_TARGET_ZONE);
        self.flood_multiplier =
            param_u32(&config.params, "flood_multiplier", DEFAULT_FLOOD_MULTIPLIER);
        self.params = config.params.clone();
        self.active = true;
        self.fired_crash = false;
        self.source_crashed = false;
        self.activations += 1;
        true
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.fired_crash = false;
        self.source_crashed = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn on_tick(&mut self, current_tick: u64, zone: Option<&mut Zone>) {
        if !self.active {
            return;
        }
        let Some(zone) = zone else { return };

        // Phase A: crash the source zone, once.
        if zone.zone_id() == self.source_zone && !self.fired_crash {
            self.fired_crash = true;
            self.source_crashed = true;
            self.telemetry.event(
                "fault",
                "Cascading failure: crashing source zone",
                json!({
                    "fault_id": self.id(),
                    "source_zone": self.source_zone,
                    "target_zone": self.target_zone,
                }),
            );
            // Unwinds into the zone's isolation guard.
            panic!("cascading zone failure: source zone crash injected");
        }

        // Phase B: flood the target zone once the source has gone down.
        if zone.zone_id() == self.target_zone && self.source_crashed {
            let injected = flood_zone(zone, current_tick, self.flood_multiplier);
            self.telemetry.event(
                "fault",
                "Cascading failure: target zone flooded",
                json!({
                    "fault_id": self.id(),
                    "target_zone": self.target_zone,
                    "events_injected": injected,
                }),
            );
        }
    }

    fn status(&self) -> FaultStatus {
        FaultStatus {
            id: self.id().to_string(),
            mode: self.mode(),
            active: self.active,
            activations: self.activations,
            ticks_elapsed: 0,
            config: params_snapshot(self.active, &self.params),
            detail: json!({
                "source_crashed": self.source_crashed,
                "source_zone": self.source_zone,
                "target_zone": self.target_zone,
            }),
        }
    }
}
