//! Memory pressure: hold committed memory while active.

use ashveil_core::{Telemetry, Zone};
use serde_json::json;

use crate::{param_u32, params_snapshot, Fault, FaultConfig, FaultMode, FaultStatus};

const DEFAULT_MEGABYTES: u32 = 64;
const ONE_MIB: usize = 1024 * 1024;

/// Allocates `megabytes` MiB in 1 MiB chunks on activation and releases them
/// on deactivation.
///
/// Every byte is written (0xAB) so the OS actually commits the pages —
/// untouched allocations would be hidden by lazy allocation and the fault
/// would be invisible. Dropping the scenario releases the buffers even if
/// the registry is torn down with the fault still active.
pub struct MemoryPressureFault {
    active: bool,
    params: serde_json::Value,
    activations: u64,
    megabytes: u32,
    buffers: Vec<Vec<u8>>,
    telemetry: Telemetry,
}

impl MemoryPressureFault {
    /// Creates the scenario, inactive.
    #[must_use]
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            active: false,
            params: json!({}),
            activations: 0,
            megabytes: DEFAULT_MEGABYTES,
            buffers: Vec::new(),
            telemetry,
        }
    }

    /// Bytes currently held by this fault.
    #[must_use]
    pub fn bytes_allocated(&self) -> usize {
        self.buffers.iter().map(Vec::len).sum()
    }
}

impl Fault for MemoryPressureFault {
    fn id(&self) -> &'static str {
        "memory-pressure"
    }

    fn description(&self) -> &'static str {
        "Allocate and hold large memory buffers"
    }

    fn mode(&self) -> FaultMode {
        FaultMode::Ambient
    }

    fn activate(&mut self, config: &FaultConfig) -> bool {
        self.megabytes = param_u32(&config.params, "megabytes", DEFAULT_MEGABYTES);
        self.params = config.params.clone();
        self.active = true;
        self.activations += 1;

        self.buffers.clear();
        self.buffers.reserve(self.megabytes as usize);
        for _ in 0..self.megabytes {
            // vec! writes the fill byte through the whole chunk, committing
            // every page.
            self.buffers.push(vec![0xAB; ONE_MIB]);
        }

        self.telemetry.event(
            "fault",
            "Memory pressure applied",
            json!({
                "fault_id": self.id(),
                "megabytes": self.megabytes,
                "bytes_allocated": self.bytes_allocated(),
            }),
        );
        true
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.buffers.clear();
        self.buffers.shrink_to_fit();
        self.telemetry.event(
            "fault",
            "Memory pressure released",
            json!({ "fault_id": self.id() }),
        );
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn on_tick(&mut self, _current_tick: u64, _zone: Option<&mut Zone>) {
        // Ambient: the buffers simply persist while active.
    }

    fn status(&self) -> FaultStatus {
        FaultStatus {
            id: self.id().to_string(),
            mode: self.mode(),
            active: self.active,
            activations: self.activations,
            ticks_elapsed: 0,
            config: params_snapshot(self.active, &self.params),
            detail: json!({ "bytes_allocated": self.bytes_allocated() }),
        }
    }
}
