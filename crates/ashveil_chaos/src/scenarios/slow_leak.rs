//! Slow leak: a creeping per-tick delay that grows the longer the fault
//! stays active, like cache bloat or an actual leak degrading a server.

use std::thread;
use std::time::Duration;

use ashveil_core::Zone;
use serde_json::json;

use crate::{param_u32, params_snapshot, Fault, FaultConfig, FaultMode, FaultStatus};

const DEFAULT_INCREMENT_MS: u32 = 1;
const DEFAULT_INCREMENT_EVERY: u32 = 100;

/// Every `increment_every` dispatches, adds `increment_ms` to an accumulated
/// delay, then blocks for the accumulated total each dispatch.
pub struct SlowLeakFault {
    active: bool,
    params: serde_json::Value,
    activations: u64,
    increment_ms: u32,
    increment_every: u32,
    current_delay_ms: u32,
    tick_counter: u64,
}

impl SlowLeakFault {
    /// Creates the scenario, inactive.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: false,
            params: json!({}),
            activations: 0,
            increment_ms: DEFAULT_INCREMENT_MS,
            increment_every: DEFAULT_INCREMENT_EVERY,
            current_delay_ms: 0,
            tick_counter: 0,
        }
    }

    /// The accumulated delay applied on each dispatch, for status/testing.
    #[must_use]
    pub fn current_delay_ms(&self) -> u32 {
        self.current_delay_ms
    }
}

impl Default for SlowLeakFault {
    fn default() -> Self {
        Self::new()
    }
}

impl Fault for SlowLeakFault {
    fn id(&self) -> &'static str {
        "slow-leak"
    }

    fn description(&self) -> &'static str {
        "Increment tick processing delay over time"
    }

    fn mode(&self) -> FaultMode {
        FaultMode::TickScoped
    }

    fn activate(&mut self, config: &FaultConfig) -> bool {
        self.increment_ms = param_u32(&config.params, "increment_ms", DEFAULT_INCREMENT_MS);
        self.increment_every =
            param_u32(&config.params, "increment_every", DEFAULT_INCREMENT_EVERY);
        self.params = config.params.clone();
        self.active = true;
        self.current_delay_ms = 0;
        self.tick_counter = 0;
        self.activations += 1;
        true
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.current_delay_ms = 0;
        self.tick_counter = 0;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn on_tick(&mut self, _current_tick: u64, _zone: Option<&mut Zone>) {
        if !self.active {
            return;
        }
        self.tick_counter += 1;
        if self.increment_every > 0 && self.tick_counter % u64::from(self.increment_every) == 0 {
            self.current_delay_ms += self.increment_ms;
        }
        if self.current_delay_ms > 0 {
            thread::sleep(Duration::from_millis(u64::from(self.current_delay_ms)));
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
            detail: json!({ "current_delay_ms": self.current_delay_ms }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_creeps_on_schedule() {
        let mut fault = SlowLeakFault::new();
        fault.activate(&FaultConfig {
            params: json!({ "increment_ms": 2, "increment_every": 3 }),
            ..Default::default()
        });

        fault.on_tick(1, None);
        fault.on_tick(2, None);
        assert_eq!(fault.current_delay_ms(), 0);

        fault.on_tick(3, None);
        assert_eq!(fault.current_delay_ms(), 2);

        for tick in 4..=6 {
            fault.on_tick(tick, None);
        }
        assert_eq!(fault.current_delay_ms(), 4);
    }

    #[test]
    fn deactivation_resets_the_leak() {
        let mut fault = SlowLeakFault::new();
        fault.activate(&FaultConfig {
            params: json!({ "increment_ms": 5, "increment_every": 1 }),
            ..Default::default()
        });
        fault.on_tick(1, None);
        assert_eq!(fault.current_delay_ms(), 5);

        fault.deactivate();
        assert_eq!(fault.current_delay_ms(), 0);
    }
}
