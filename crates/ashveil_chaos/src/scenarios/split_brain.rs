//! Split brain: the same phantom entities exist in several zones at once,
//! and their positions diverge a little more every tick.

use std::collections::BTreeSet;

use ashveil_core::{Entity, GameEvent, Position, Telemetry, Zone, ZoneId};
use serde_json::json;

use crate::{param_u32, param_u64, params_snapshot, Fault, FaultConfig, FaultMode, FaultStatus};

const DEFAULT_PHANTOM_COUNT: u32 = 2;
const DEFAULT_PHANTOM_BASE_ID: u64 = 2_000_001;

/// Creates phantom NPCs in each dispatched zone, then feeds them movement
/// that depends on zone-id parity: odd zones walk east, even zones walk
/// north. Identical ids with diverging positions is the split-brain signal
/// an observability stack should catch.
pub struct SplitBrainFault {
    active: bool,
    params: serde_json::Value,
    activations: u64,
    phantom_count: u32,
    phantom_base_id: u64,
    phantoms_created: BTreeSet<ZoneId>,
    tick_counter: u64,
    telemetry: Telemetry,
}

impl SplitBrainFault {
    /// Creates the scenario, inactive.
    #[must_use]
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            active: false,
            params: json!({}),
            activations: 0,
            phantom_count: DEFAULT_PHANTOM_COUNT,
            phantom_base_id: DEFAULT_PHANTOM_BASE_ID,
            phantoms_created: BTreeSet::new(),
            tick_counter: 0,
            telemetry,
        }
    }
}

impl Fault for SplitBrainFault {
    fn id(&self) -> &'static str {
        "split-brain"
    }

    fn description(&self) -> &'static str {
        "Create phantom entities with divergent state across zones"
    }

    fn mode(&self) -> FaultMode {
        FaultMode::TickScoped
    }

    fn activate(&mut self, config: &FaultConfig) -> bool {
        self.phantom_count = param_u32(&config.params, "phantom_count", DEFAULT_PHANTOM_COUNT);
        self.phantom_base_id =
            param_u64(&config.params, "phantom_base_id", DEFAULT_PHANTOM_BASE_ID);
        self.params = config.params.clone();
        self.active = true;
        self.phantoms_created.clear();
        self.tick_counter = 0;
        self.activations += 1;
        true
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.phantoms_created.clear();
        self.tick_counter = 0;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn on_tick(&mut self, _current_tick: u64, zone: Option<&mut Zone>) {
        if !self.active {
            return;
        }
        let Some(zone) = zone else { return };

        self.tick_counter += 1;
        let zone_id = zone.zone_id();

        // Phase 1: seed the phantoms once per zone per activation.
        if self.phantoms_created.insert(zone_id) {
            for i in 0..u64::from(self.phantom_count) {
                // Phantom ids live above the NPC range; a collision means
                // the phantom already exists, which is fine.
                let _ = zone.add_entity(Entity::npc(self.phantom_base_id + i));
            }
            self.telemetry.event(
                "fault",
                "Split brain: phantoms created",
                json!({
                    "fault_id": self.id(),
                    "zone_id": zone_id,
                    "phantom_count": self.phantom_count,
                }),
            );
        }

        // Phase 2: divergent movement every dispatch.
        #[allow(clippy::cast_precision_loss)]
        let step = (self.tick_counter * 10) as f32;
        let target = if zone_id % 2 == 1 {
            Position::new(step, 0.0, 0.0)
        } else {
            Position::new(0.0, step, 0.0)
        };
        for i in 0..u64::from(self.phantom_count) {
            zone.push_event(GameEvent::Movement {
                session_id: self.phantom_base_id + i,
                target,
            });
        }

        self.telemetry.event(
            "fault",
            "Split brain: divergent state",
            json!({
                "fault_id": self.id(),
                "zone_id": zone_id,
                "tick_counter": self.tick_counter,
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
            detail: json!({
                "zones_seeded": self.phantoms_created.len(),
                "phantom_base_id": self.phantom_base_id,
            }),
        }
    }
}
