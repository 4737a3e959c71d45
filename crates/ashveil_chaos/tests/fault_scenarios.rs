//! Full-stack fault drills: registry wired into zone pre-tick hooks, driven
//! the way the server's tick callback drives it (registry bookkeeping first,
//! then all zones).

use std::sync::Arc;

use parking_lot::Mutex;

use ashveil_chaos::scenarios::standard_scenarios;
use ashveil_chaos::{FaultConfig, FaultRegistry};
use ashveil_core::{Telemetry, ZoneConfig, ZoneManager, ZoneState};
use serde_json::json;

struct Harness {
    manager: ZoneManager,
    registry: Arc<Mutex<FaultRegistry>>,
    tick: u64,
}

impl Harness {
    fn new(telemetry: Telemetry) -> Self {
        let mut manager = ZoneManager::new(telemetry.clone());
        manager.create_zone(ZoneConfig { zone_id: 1, name: "Thornwood Vale".into() });
        manager.create_zone(ZoneConfig { zone_id: 2, name: "Cinder Flats".into() });

        let mut registry = FaultRegistry::new(telemetry.clone());
        for fault in standard_scenarios(&telemetry) {
            registry.register(fault).unwrap();
        }
        let registry = Arc::new(Mutex::new(registry));
        ashveil_chaos::wire_zone_hooks(&registry, &mut manager);

        Self { manager, registry, tick: 0 }
    }

    /// One simulated game-loop tick: fault bookkeeping, then all zones.
    fn step(&mut self) -> ashveil_core::ZoneManagerTickResult {
        let tick = self.tick;
        self.tick += 1;
        self.registry.lock().on_tick(tick);
        self.manager.tick_all(tick)
    }
}

#[test]
fn all_eight_scenarios_register() {
    let harness = Harness::new(Telemetry::disabled());
    let registry = harness.registry.lock();
    assert_eq!(registry.fault_count(), 8);
    assert_eq!(
        registry.registered_ids(),
        vec![
            "cascading-zone-failure",
            "event-queue-flood",
            "latency-spike",
            "memory-pressure",
            "session-crash",
            "slow-leak",
            "split-brain",
            "thundering-herd",
        ]
    );
}

#[test]
fn cascading_failure_crashes_source_floods_target_then_recovers() {
    let mut harness = Harness::new(Telemetry::disabled());
    harness.manager.assign_session(20, 2).unwrap();
    harness.manager.assign_session(21, 2).unwrap();

    harness
        .registry
        .lock()
        .activate("cascading-zone-failure", FaultConfig::default())
        .unwrap();

    // Tick 1: zone 1 goes down; zone 2 absorbs the displaced flood.
    let first = harness.step();
    assert_eq!(harness.manager.zone(1).unwrap().state(), ZoneState::Crashed);
    assert_eq!(harness.manager.zone(2).unwrap().state(), ZoneState::Active);
    let zone2 = first.zone_results.iter().find(|r| r.zone_id == 2).unwrap();
    assert_eq!(zone2.events_processed, 20);

    // The recovery arc plays out under continued flooding.
    harness.step();
    assert_eq!(harness.manager.zone(1).unwrap().state(), ZoneState::Degraded);
    harness.step();
    assert_eq!(harness.manager.zone(1).unwrap().state(), ZoneState::Active);

    // Zone 1's tick counter never stopped advancing.
    assert_eq!(harness.manager.zone(1).unwrap().health().total_ticks, 3);
    assert_eq!(harness.manager.zone(1).unwrap().health().error_count, 1);
}

#[test]
fn thundering_herd_brings_everyone_back() {
    let mut harness = Harness::new(Telemetry::disabled());
    for session in [10, 11, 12] {
        harness.manager.assign_session(session, 1).unwrap();
    }

    harness
        .registry
        .lock()
        .activate(
            "thundering-herd",
            FaultConfig {
                params: json!({ "reconnect_delay_ticks": 20 }),
                target_zone_id: 1,
                ..Default::default()
            },
        )
        .unwrap();

    harness.step();
    assert_eq!(harness.manager.zone(1).unwrap().entity_count(), 0);

    for _ in 0..21 {
        harness.step();
    }

    let zone = harness.manager.zone(1).unwrap();
    assert_eq!(zone.entity_count(), 3);
    for id in [10, 11, 12] {
        assert!(zone.has_entity(id));
    }
}

#[test]
fn session_crash_removes_lowest_id_once_per_activation() {
    let (telemetry, buffer) = Telemetry::memory();
    let mut harness = Harness::new(telemetry);
    for session in [5, 6] {
        harness.manager.assign_session(session, 1).unwrap();
    }

    harness
        .registry
        .lock()
        .activate("session-crash", FaultConfig { target_zone_id: 1, ..Default::default() })
        .unwrap();

    harness.step();
    harness.step();

    let zone = harness.manager.zone(1).unwrap();
    assert!(!zone.has_entity(5));
    assert!(zone.has_entity(6));
    let crashes: Vec<_> = buffer
        .records()
        .into_iter()
        .filter(|r| r["message"] == "Session crashed by fault injection")
        .collect();
    assert_eq!(crashes.len(), 1);
    assert_eq!(crashes[0]["data"]["session_id"], 5);
}

#[test]
fn duration_limited_fault_expires_mid_run() {
    let mut harness = Harness::new(Telemetry::disabled());
    harness.manager.assign_session(30, 1).unwrap();

    harness
        .registry
        .lock()
        .activate(
            "event-queue-flood",
            FaultConfig {
                params: json!({ "multiplier": 3 }),
                target_zone_id: 1,
                duration_ticks: 3,
            },
        )
        .unwrap();

    let first = harness.step();
    assert_eq!(first.zone_results[0].events_processed, 3);
    let second = harness.step();
    assert_eq!(second.zone_results[0].events_processed, 3);
    assert!(harness.registry.lock().is_active("event-queue-flood"));

    // The third bookkeeping pass exhausts the duration before dispatch.
    let third = harness.step();
    assert!(!harness.registry.lock().is_active("event-queue-flood"));
    assert_eq!(third.zone_results[0].events_processed, 0);
}

#[test]
fn split_brain_diverges_between_zones() {
    let mut harness = Harness::new(Telemetry::disabled());
    harness.registry.lock().activate("split-brain", FaultConfig::default()).unwrap();

    harness.step();
    harness.step();

    let odd = &harness.manager.zone(1).unwrap().entities()[&2_000_001];
    let even = &harness.manager.zone(2).unwrap().entities()[&2_000_001];
    assert!(odd.position.x > 0.0);
    assert!(even.position.y > 0.0);
    assert_ne!(odd.position, even.position);
}

#[test]
fn memory_pressure_reports_bytes_and_releases() {
    let mut harness = Harness::new(Telemetry::disabled());
    harness
        .registry
        .lock()
        .activate(
            "memory-pressure",
            FaultConfig { params: json!({ "megabytes": 2 }), ..Default::default() },
        )
        .unwrap();

    harness.step();
    let status = harness.registry.lock().fault_status("memory-pressure").unwrap();
    assert_eq!(status.detail["bytes_allocated"], 2 * 1024 * 1024);

    harness.registry.lock().deactivate("memory-pressure").unwrap();
    let status = harness.registry.lock().fault_status("memory-pressure").unwrap();
    assert_eq!(status.detail["bytes_allocated"], 0);
}

#[test]
fn deactivate_all_quiesces_the_world() {
    let mut harness = Harness::new(Telemetry::disabled());
    harness.manager.assign_session(40, 1).unwrap();
    {
        let mut registry = harness.registry.lock();
        registry.activate("event-queue-flood", FaultConfig::default()).unwrap();
        registry.activate("split-brain", FaultConfig::default()).unwrap();
        assert_eq!(registry.active_count(), 2);
    }
    let noisy = harness.step();
    assert!(noisy.total_events > 0);

    harness.registry.lock().deactivate_all();
    assert_eq!(harness.registry.lock().active_count(), 0);

    // Split-brain phantoms persist as entities, but nothing new is injected.
    let quiet = harness.step();
    assert_eq!(quiet.total_events, 0);
}
