//! Thundering herd: every player in a zone vanishes at once, then they all
//! come back at once after a fixed delay.

use std::collections::{BTreeMap, BTreeSet};

use ashveil_core::{Entity, EntityKind, Telemetry, Zone, ZoneId};
use serde_json::json;

use crate::{param_u32, params_snapshot, Fault, FaultConfig, FaultMode, FaultStatus};

const DEFAULT_RECONNECT_DELAY_TICKS: u32 = 20;

/// Per zone: removes every player entity on first dispatch (remembering
/// their ids), then re-adds them all once `reconnect_delay_ticks` have
/// passed since the disconnect. NPCs are untouched.
pub struct ThunderingHerdFault {
    active: bool,
    params: serde_json::Value,
    activations: u64,
    reconnect_delay_ticks: u32,
    disconnect_done: BTreeSet<ZoneId>,
    reconnect_done: BTreeSet<ZoneId>,
    stored_players: BTreeMap<ZoneId, Vec<u64>>,
    disconnect_tick: Option<u64>,
    telemetry: Telemetry,
}

impl ThunderingHerdFault {
    /// Creates the scenario, inactive.
    #[must_use]
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            active: false,
            params: json!({}),
            activations: 0,
            reconnect_delay_ticks: DEFAULT_RECONNECT_DELAY_TICKS,
            disconnect_done: BTreeSet::new(),
            reconnect_done: BTreeSet::new(),
            stored_players: BTreeMap::new(),
            disconnect_tick: None,
            telemetry,
        }
    }
}

impl Fault for ThunderingHerdFault {
    fn id(&self) -> &'static str {
        "thundering-herd"
    }

    fn description(&self) -> &'static str {
        "Mass-disconnect all players, then simultaneous reconnect"
    }

    fn mode(&self) -> FaultMode {
        FaultMode::TickScoped
    }

    fn activate(&mut self, config: &FaultConfig) -> bool {
        self.reconnect_delay_ticks =
            param_u32(&config.params, "reconnect_delay_ticks", DEFAULT_RECONNECT_DELAY_TICKS);
        self.params = config.params.clone();
        self.active = true;
        self.disconnect_done.clear();
        self.reconnect_done.clear();
        self.stored_players.clear();
        self.disconnect_tick = None;
        self.activations += 1;
        true
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.disconnect_done.clear();
        self.reconnect_done.clear();
        self.stored_players.clear();
        self.disconnect_tick = None;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn on_tick(&mut self, current_tick: u64, zone: Option<&mut Zone>) {
        if !self.active {
            return;
        }
        let Some(zone) = zone else { return };
        let zone_id = zone.zone_id();

        // Phase 1: mass disconnect — remove every player, remember the ids.
        if self.disconnect_done.insert(zone_id) {
            self.disconnect_tick.get_or_insert(current_tick);
            let player_ids: Vec<u64> = zone
                .entities()
                .values()
                .filter(|e| e.kind == EntityKind::Player)
                .map(|e| e.id)
                .collect();
            for &id in &player_ids {
                zone.remove_entity(id);
            }
            self.telemetry.event(
                "fault",
                "Thundering herd: mass disconnect",
                json!({
                    "fault_id": self.id(),
                    "zone_id": zone_id,
                    "players_disconnected": player_ids.len(),
                }),
            );
            self.stored_players.insert(zone_id, player_ids);
            return;
        }

        // Phase 2: simultaneous reconnect after the delay.
        let Some(disconnect_tick) = self.disconnect_tick else { return };
        if !self.reconnect_done.contains(&zone_id)
            && current_tick >= disconnect_tick + u64::from(self.reconnect_delay_ticks)
        {
            self.reconnect_done.insert(zone_id);
            let stored = self.stored_players.get(&zone_id).cloned().unwrap_or_default();
            for &id in &stored {
                let _ = zone.add_entity(Entity::player(id));
            }
            self.telemetry.event(
                "fault",
                "Thundering herd: mass reconnect",
                json!({
                    "fault_id": self.id(),
                    "zone_id": zone_id,
                    "players_reconnected": stored.len(),
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
                "zones_disconnected": self.disconnect_done.len(),
                "zones_reconnected": self.reconnect_done.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ashveil_core::ZoneConfig;

    fn zone_with_players(ids: &[u64]) -> Zone {
        let mut zone = Zone::new(
            ZoneConfig { zone_id: 1, name: "Herd".into() },
            Telemetry::disabled(),
        );
        for &id in ids {
            zone.add_entity(Entity::player(id)).unwrap();
        }
        zone
    }

    #[test]
    fn disconnects_then_reconnects_after_delay() {
        let mut fault = ThunderingHerdFault::new(Telemetry::disabled());
        fault.activate(&FaultConfig {
            params: json!({ "reconnect_delay_ticks": 20 }),
            ..Default::default()
        });
        let mut zone = zone_with_players(&[10, 11, 12]);

        fault.on_tick(100, Some(&mut zone));
        assert_eq!(zone.entity_count(), 0);

        // The herd stays away until the delay expires...
        for tick in 101..120 {
            fault.on_tick(tick, Some(&mut zone));
            assert_eq!(zone.entity_count(), 0);
        }

        // ...and returns in one burst.
        fault.on_tick(120, Some(&mut zone));
        assert_eq!(zone.entity_count(), 3);
        for id in [10, 11, 12] {
            assert!(zone.has_entity(id));
        }
    }

    #[test]
    fn npcs_are_left_alone() {
        let mut fault = ThunderingHerdFault::new(Telemetry::disabled());
        fault.activate(&FaultConfig::default());
        let mut zone = zone_with_players(&[10]);
        let mut npc = Entity::npc(1_000_001);
        npc.combat.base_attack_damage = 5;
        zone.add_entity(npc).unwrap();

        fault.on_tick(1, Some(&mut zone));

        assert!(!zone.has_entity(10));
        assert!(zone.has_entity(1_000_001));
    }

    #[test]
    fn reconnect_happens_once() {
        let mut fault = ThunderingHerdFault::new(Telemetry::disabled());
        fault.activate(&FaultConfig {
            params: json!({ "reconnect_delay_ticks": 1 }),
            ..Default::default()
        });
        let mut zone = zone_with_players(&[10]);

        fault.on_tick(1, Some(&mut zone));
        fault.on_tick(2, Some(&mut zone));
        assert!(zone.has_entity(10));

        // A later manual removal is not undone by the fault.
        zone.remove_entity(10);
        fault.on_tick(3, Some(&mut zone));
        assert!(!zone.has_entity(10));
    }
}
