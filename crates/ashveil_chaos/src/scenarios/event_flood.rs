//! Event queue flood: multiply every resident entity into a burst of
//! synthetic movement events each tick.

use ashveil_core::{Telemetry, Zone};
use serde_json::json;

use crate::scenarios::flood_zone;
use crate::{param_u32, params_snapshot, Fault, FaultConfig, FaultMode, FaultStatus};

const DEFAULT_MULTIPLIER: u32 = 10;

/// Pushes `multiplier` deterministic movement events per entity per tick.
pub struct EventQueueFloodFault {
    active: bool,
    params: serde_json::Value,
    activations: u64,
    multiplier: u32,
    telemetry: Telemetry,
}

impl EventQueueFloodFault {
    /// Creates the scenario, inactive.
    #[must_use]
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            active: false,
            params: json!({}),
            activations: 0,
            multiplier: DEFAULT_MULTIPLIER,
            telemetry,
        }
    }
}

impl Fault for EventQueueFloodFault {
    fn id(&self) -> &'static str {
        "event-queue-flood"
    }

    fn description(&self) -> &'static str {
        "Inject multiplied synthetic events into a zone queue"
    }

    fn mode(&self) -> FaultMode {
        FaultMode::TickScoped
    }

    fn activate(&mut self, config: &FaultConfig) -> bool {
        self.multiplier = param_u32(&config.params, "multiplier", DEFAULT_MULTIPLIER);
        self.params = config.params.clone();
        self.active = true;
        self.activations += 1;
        true
    }

    fn deactivate(&mut self) {
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn on_tick(&mut self, current_tick: u64, zone: Option<&mut Zone>) {
        if !self.active {
            return;
        }
        let Some(zone) = zone else { return };

        let injected = flood_zone(zone, current_tick, self.multiplier);
        self.telemetry.event(
            "fault",
            "Event queue flooded",
            json!({
                "fault_id": self.id(),
                "zone_id": zone.zone_id(),
                "events_injected": injected,
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
            detail: json!({ "multiplier": self.multiplier }),
        }
    }
}
