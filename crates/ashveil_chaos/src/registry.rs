//! # Fault Registry
//!
//! Owns every registered scenario as a heterogeneous collection keyed by id,
//! tracks activation durations, and dispatches tick-scoped faults into zone
//! pre-tick hooks.
//!
//! Not a singleton: the server creates one and shares it behind an
//! `Arc<Mutex<…>>` between the control dispatcher and the zone hooks. All of
//! that access happens on the simulation thread, so the lock is never
//! contended; it exists to satisfy the borrow across the hook boundary.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;

use ashveil_core::{Telemetry, Zone, ZoneManager};

use crate::{Fault, FaultConfig, FaultMode, FaultStatus};

/// Failures of registry operations. Invalid operations, not crashes: the
/// control channel reports them back to the operator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChaosError {
    /// A fault with this id is already registered.
    #[error("fault '{0}' is already registered")]
    DuplicateFault(String),

    /// No fault with this id is registered.
    #[error("unknown fault '{0}'")]
    UnknownFault(String),

    /// Deactivation requested for a fault that is not active.
    #[error("fault '{0}' is not active")]
    NotActive(String),

    /// The scenario rejected its activation configuration.
    #[error("fault '{0}' rejected activation")]
    ActivationRejected(String),
}

/// Per-activation bookkeeping for duration auto-expiry.
#[derive(Debug)]
struct ActivationRecord {
    config: FaultConfig,
    ticks_elapsed: u64,
}

/// Owns and manages all registered fault scenarios.
pub struct FaultRegistry {
    faults: BTreeMap<String, Box<dyn Fault>>,
    activations: BTreeMap<String, ActivationRecord>,
    current_tick: u64,
    telemetry: Telemetry,
}

impl FaultRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            faults: BTreeMap::new(),
            activations: BTreeMap::new(),
            current_tick: 0,
            telemetry,
        }
    }

    /// Registers a scenario. Fails if the id is taken.
    pub fn register(&mut self, fault: Box<dyn Fault>) -> Result<(), ChaosError> {
        let id = fault.id().to_string();
        if self.faults.contains_key(&id) {
            return Err(ChaosError::DuplicateFault(id));
        }
        self.faults.insert(id, fault);
        Ok(())
    }

    /// Activates a fault with the given configuration.
    pub fn activate(&mut self, id: &str, config: FaultConfig) -> Result<(), ChaosError> {
        let fault = self
            .faults
            .get_mut(id)
            .ok_or_else(|| ChaosError::UnknownFault(id.to_string()))?;
        if !fault.activate(&config) {
            return Err(ChaosError::ActivationRejected(id.to_string()));
        }
        self.telemetry.event(
            "fault",
            "Fault activated",
            json!({
                "fault_id": id,
                "target_zone_id": config.target_zone_id,
                "duration_ticks": config.duration_ticks,
            }),
        );
        self.activations
            .insert(id.to_string(), ActivationRecord { config, ticks_elapsed: 0 });
        Ok(())
    }

    /// Deactivates an active fault.
    pub fn deactivate(&mut self, id: &str) -> Result<(), ChaosError> {
        let fault = self
            .faults
            .get_mut(id)
            .ok_or_else(|| ChaosError::UnknownFault(id.to_string()))?;
        if !fault.is_active() {
            return Err(ChaosError::NotActive(id.to_string()));
        }
        fault.deactivate();
        self.activations.remove(id);
        self.telemetry.event("fault", "Fault deactivated", json!({ "fault_id": id }));
        Ok(())
    }

    /// Deactivates every active fault.
    pub fn deactivate_all(&mut self) {
        for (id, fault) in &mut self.faults {
            if fault.is_active() {
                fault.deactivate();
                self.telemetry.event("fault", "Fault deactivated", json!({ "fault_id": id }));
            }
        }
        self.activations.clear();
    }

    /// Whether the fault with this id is currently active.
    #[must_use]
    pub fn is_active(&self, id: &str) -> bool {
        self.faults.get(id).is_some_and(|f| f.is_active())
    }

    /// Status snapshot of one fault, duration bookkeeping included.
    #[must_use]
    pub fn fault_status(&self, id: &str) -> Option<FaultStatus> {
        let fault = self.faults.get(id)?;
        let mut status = fault.status();
        if let Some(record) = self.activations.get(id) {
            status.ticks_elapsed = record.ticks_elapsed;
        }
        Some(status)
    }

    /// Status snapshots of every registered fault, in id order.
    #[must_use]
    pub fn all_status(&self) -> Vec<FaultStatus> {
        self.faults.keys().filter_map(|id| self.fault_status(id)).collect()
    }

    /// Every registered fault id, in order.
    #[must_use]
    pub fn registered_ids(&self) -> Vec<String> {
        self.faults.keys().cloned().collect()
    }

    /// Number of registered faults.
    #[must_use]
    pub fn fault_count(&self) -> usize {
        self.faults.len()
    }

    /// Number of currently active faults.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.faults.values().filter(|f| f.is_active()).count()
    }

    /// Per-tick bookkeeping: ticks ambient faults, advances every active
    /// fault's elapsed count, and auto-expires faults whose duration is
    /// exhausted. Called once per game tick, before the zones tick.
    pub fn on_tick(&mut self, current_tick: u64) {
        self.current_tick = current_tick;

        let mut expired = Vec::new();
        for (id, record) in &mut self.activations {
            let Some(fault) = self.faults.get_mut(id) else { continue };
            if !fault.is_active() {
                continue;
            }

            // Tick-scoped faults fire from execute_pre_tick_faults instead.
            if fault.mode() == FaultMode::Ambient {
                fault.on_tick(current_tick, None);
            }

            record.ticks_elapsed += 1;
            if record.config.duration_ticks > 0
                && record.ticks_elapsed >= record.config.duration_ticks
            {
                expired.push(id.clone());
            }
        }

        for id in expired {
            tracing::debug!(fault_id = %id, "fault duration exhausted, deactivating");
            let _ = self.deactivate(&id);
        }
    }

    /// Dispatches every active tick-scoped fault that targets `zone`.
    ///
    /// Called from the zone's pre-tick hook, inside its isolation guard — a
    /// panicking scenario crashes the zone, never the registry.
    pub fn execute_pre_tick_faults(&mut self, zone: &mut Zone) {
        let current_tick = self.current_tick;
        for (id, record) in &self.activations {
            let Some(fault) = self.faults.get_mut(id) else { continue };
            if !fault.is_active() || fault.mode() != FaultMode::TickScoped {
                continue;
            }
            let target = record.config.target_zone_id;
            if target == 0 || target == zone.zone_id() {
                fault.on_tick(current_tick, Some(zone));
            }
        }
    }
}

/// Installs a pre-tick hook on every zone that dispatches the registry's
/// tick-scoped faults into it.
///
/// Tear-down order matters: clear zone hooks before dropping the registry.
pub fn wire_zone_hooks(registry: &Arc<Mutex<FaultRegistry>>, manager: &mut ZoneManager) {
    for zone in manager.zones_mut() {
        let registry = Arc::clone(registry);
        zone.set_pre_tick_hook(Box::new(move |zone| {
            registry.lock().execute_pre_tick_faults(zone);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal scenario for registry-level tests: counts dispatches.
    struct CountingFault {
        active: bool,
        activations: u64,
        dispatches: Arc<Mutex<Vec<Option<u32>>>>,
        mode: FaultMode,
    }

    impl CountingFault {
        fn new(mode: FaultMode) -> (Self, Arc<Mutex<Vec<Option<u32>>>>) {
            let dispatches = Arc::new(Mutex::new(Vec::new()));
            (
                Self { active: false, activations: 0, dispatches: Arc::clone(&dispatches), mode },
                dispatches,
            )
        }
    }

    impl Fault for CountingFault {
        fn id(&self) -> &'static str {
            "counting"
        }
        fn description(&self) -> &'static str {
            "test fault that records dispatches"
        }
        fn mode(&self) -> FaultMode {
            self.mode
        }
        fn activate(&mut self, _config: &FaultConfig) -> bool {
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
        fn on_tick(&mut self, _current_tick: u64, zone: Option<&mut Zone>) {
            self.dispatches.lock().push(zone.map(|z| z.zone_id()));
        }
        fn status(&self) -> FaultStatus {
            FaultStatus {
                id: self.id().to_string(),
                mode: self.mode,
                active: self.active,
                activations: self.activations,
                ticks_elapsed: 0,
                config: serde_json::json!({}),
                detail: serde_json::json!({}),
            }
        }
    }

    fn test_zone(id: u32) -> Zone {
        Zone::new(
            ashveil_core::ZoneConfig { zone_id: id, name: format!("Z{id}") },
            Telemetry::disabled(),
        )
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = FaultRegistry::new(Telemetry::disabled());
        let (fault, _) = CountingFault::new(FaultMode::TickScoped);
        registry.register(Box::new(fault)).unwrap();

        let (again, _) = CountingFault::new(FaultMode::TickScoped);
        assert_eq!(
            registry.register(Box::new(again)),
            Err(ChaosError::DuplicateFault("counting".into()))
        );
        assert_eq!(registry.fault_count(), 1);
    }

    #[test]
    fn activate_unknown_fault_fails() {
        let mut registry = FaultRegistry::new(Telemetry::disabled());
        assert_eq!(
            registry.activate("ghost", FaultConfig::default()),
            Err(ChaosError::UnknownFault("ghost".into()))
        );
    }

    #[test]
    fn deactivate_inactive_fault_fails() {
        let mut registry = FaultRegistry::new(Telemetry::disabled());
        let (fault, _) = CountingFault::new(FaultMode::TickScoped);
        registry.register(Box::new(fault)).unwrap();

        assert_eq!(registry.deactivate("counting"), Err(ChaosError::NotActive("counting".into())));
    }

    #[test]
    fn reactivation_is_observationally_a_single_activation() {
        let mut registry = FaultRegistry::new(Telemetry::disabled());
        let (fault, _) = CountingFault::new(FaultMode::TickScoped);
        registry.register(Box::new(fault)).unwrap();

        registry.activate("counting", FaultConfig::default()).unwrap();
        registry.deactivate("counting").unwrap();
        registry.activate("counting", FaultConfig::default()).unwrap();

        let status = registry.fault_status("counting").unwrap();
        assert!(status.active);
        assert_eq!(status.ticks_elapsed, 0);
        assert_eq!(status.activations, 2);
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn ambient_faults_tick_without_a_zone() {
        let mut registry = FaultRegistry::new(Telemetry::disabled());
        let (fault, dispatches) = CountingFault::new(FaultMode::Ambient);
        registry.register(Box::new(fault)).unwrap();
        registry.activate("counting", FaultConfig::default()).unwrap();

        registry.on_tick(1);
        registry.on_tick(2);

        assert_eq!(*dispatches.lock(), vec![None, None]);
    }

    #[test]
    fn tick_scoped_faults_respect_zone_targeting() {
        let mut registry = FaultRegistry::new(Telemetry::disabled());
        let (fault, dispatches) = CountingFault::new(FaultMode::TickScoped);
        registry.register(Box::new(fault)).unwrap();
        registry
            .activate("counting", FaultConfig { target_zone_id: 2, ..FaultConfig::default() })
            .unwrap();

        registry.on_tick(1);
        let mut zone1 = test_zone(1);
        let mut zone2 = test_zone(2);
        registry.execute_pre_tick_faults(&mut zone1);
        registry.execute_pre_tick_faults(&mut zone2);

        assert_eq!(*dispatches.lock(), vec![Some(2)]);
    }

    #[test]
    fn target_zone_zero_hits_every_zone() {
        let mut registry = FaultRegistry::new(Telemetry::disabled());
        let (fault, dispatches) = CountingFault::new(FaultMode::TickScoped);
        registry.register(Box::new(fault)).unwrap();
        registry.activate("counting", FaultConfig::default()).unwrap();

        registry.on_tick(1);
        let mut zone1 = test_zone(1);
        let mut zone2 = test_zone(2);
        registry.execute_pre_tick_faults(&mut zone1);
        registry.execute_pre_tick_faults(&mut zone2);

        assert_eq!(*dispatches.lock(), vec![Some(1), Some(2)]);
    }

    #[test]
    fn duration_auto_expires_faults() {
        let (telemetry, buffer) = Telemetry::memory();
        let mut registry = FaultRegistry::new(telemetry);
        let (fault, _) = CountingFault::new(FaultMode::TickScoped);
        registry.register(Box::new(fault)).unwrap();
        registry
            .activate("counting", FaultConfig { duration_ticks: 3, ..FaultConfig::default() })
            .unwrap();

        registry.on_tick(1);
        registry.on_tick(2);
        assert!(registry.is_active("counting"));
        // ticks_elapsed never exceeds the configured duration.
        assert_eq!(registry.fault_status("counting").unwrap().ticks_elapsed, 2);

        registry.on_tick(3);
        assert!(!registry.is_active("counting"));
        assert!(buffer.records().iter().any(|r| r["message"] == "Fault deactivated"));
    }

    #[test]
    fn deactivate_all_sweeps_everything() {
        let mut registry = FaultRegistry::new(Telemetry::disabled());
        let (a, _) = CountingFault::new(FaultMode::TickScoped);
        registry.register(Box::new(a)).unwrap();
        registry.activate("counting", FaultConfig::default()).unwrap();

        registry.deactivate_all();
        assert_eq!(registry.active_count(), 0);
        assert!(!registry.is_active("counting"));
    }
}
