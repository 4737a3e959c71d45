//! Session crash: force-remove one entity from the zone, simulating an
//! unexpected disconnect. Fires once per activation.

use ashveil_core::{Telemetry, Zone};
use serde_json::json;

use crate::{params_snapshot, Fault, FaultConfig, FaultMode, FaultStatus};

/// Removes the lowest-id entity on the first dispatch into a non-empty zone.
///
/// Entity maps iterate in id order, so the victim is deterministic: the
/// smallest id present. Re-activation re-arms the single shot.
pub struct SessionCrashFault {
    active: bool,
    fired: bool,
    params: serde_json::Value,
    activations: u64,
    telemetry: Telemetry,
}

impl SessionCrashFault {
    /// Creates the scenario, inactive.
    #[must_use]
    pub fn new(telemetry: Telemetry) -> Self {
        Self { active: false, fired: false, params: json!({}), activations: 0, telemetry }
    }
}

impl Fault for SessionCrashFault {
    fn id(&self) -> &'static str {
        "session-crash"
    }

    fn description(&self) -> &'static str {
        "Force-terminate one player session in a zone"
    }

    fn mode(&self) -> FaultMode {
        FaultMode::TickScoped
    }

    fn activate(&mut self, config: &FaultConfig) -> bool {
        self.params = config.params.clone();
        self.active = true;
        self.fired = false;
        self.activations += 1;
        true
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.fired = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn on_tick(&mut self, _current_tick: u64, zone: Option<&mut Zone>) {
        if !self.active || self.fired {
            return;
        }
        let Some(zone) = zone else { return };
        // An empty zone leaves the shot armed for a later dispatch.
        let Some(&victim_id) = zone.entities().keys().next() else { return };

        zone.remove_entity(victim_id);
        self.fired = true;

        self.telemetry.event(
            "fault",
            "Session crashed by fault injection",
            json!({
                "fault_id": self.id(),
                "session_id": victim_id,
                "zone_id": zone.zone_id(),
            }),
        );
    }

    fn status(&self) -> FaultStatus {
        FaultStatus {
            id: self.id().to_string(),
            mode: self.mode(),
            active: self.active,
            activations: self.activations,
            ticks_elapsed: 0,
            config: params_snapshot(self.active, &self.params),
            detail: json!({ "fired": self.fired }),
        }
    }
}
