//! Latency spike: block the simulation thread for a fixed delay on every
//! dispatched tick.

use std::thread;
use std::time::Duration;

use ashveil_core::Zone;
use serde_json::json;

use crate::{param_u32, params_snapshot, Fault, FaultConfig, FaultMode, FaultStatus};

const DEFAULT_DELAY_MS: u32 = 200;

/// Adds a configurable delay to zone tick processing.
pub struct LatencySpikeFault {
    active: bool,
    params: serde_json::Value,
    activations: u64,
    delay_ms: u32,
}

impl LatencySpikeFault {
    /// Creates the scenario, inactive.
    #[must_use]
    pub fn new() -> Self {
        Self { active: false, params: json!({}), activations: 0, delay_ms: DEFAULT_DELAY_MS }
    }
}

impl Default for LatencySpikeFault {
    fn default() -> Self {
        Self::new()
    }
}

impl Fault for LatencySpikeFault {
    fn id(&self) -> &'static str {
        "latency-spike"
    }

    fn description(&self) -> &'static str {
        "Add configurable delay to tick processing"
    }

    fn mode(&self) -> FaultMode {
        FaultMode::TickScoped
    }

    fn activate(&mut self, config: &FaultConfig) -> bool {
        self.delay_ms = param_u32(&config.params, "delay_ms", DEFAULT_DELAY_MS);
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

    fn on_tick(&mut self, _current_tick: u64, _zone: Option<&mut Zone>) {
        if self.active {
            thread::sleep(Duration::from_millis(u64::from(self.delay_ms)));
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
            detail: json!({ "delay_ms": self.delay_ms }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn dispatch_blocks_for_the_configured_delay() {
        let mut fault = LatencySpikeFault::new();
        fault.activate(&FaultConfig { params: json!({ "delay_ms": 30 }), ..Default::default() });

        let start = Instant::now();
        fault.on_tick(1, None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn inactive_fault_does_not_sleep() {
        let mut fault = LatencySpikeFault::new();
        let start = Instant::now();
        fault.on_tick(1, None);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn default_delay_applies_when_unconfigured() {
        let mut fault = LatencySpikeFault::new();
        fault.activate(&FaultConfig::default());
        assert_eq!(fault.status().detail["delay_ms"], 200);
    }
}
