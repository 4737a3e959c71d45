//! # Fault Scenarios
//!
//! The eight built-in perturbers. Each is a concrete type implementing
//! [`Fault`](crate::Fault) and owning its private state; the registry holds
//! them as a heterogeneous collection keyed by id.
//!
//! | id | mode | effect |
//! |----|------|--------|
//! | `latency-spike` | tick-scoped | sleep `delay_ms` per dispatched tick |
//! | `session-crash` | tick-scoped | remove the lowest-id entity, once |
//! | `event-queue-flood` | tick-scoped | push `multiplier`× synthetic moves |
//! | `memory-pressure` | ambient | hold `megabytes` of touched pages |
//! | `cascading-zone-failure` | tick-scoped | crash source zone, flood target |
//! | `slow-leak` | tick-scoped | creeping per-tick delay |
//! | `split-brain` | tick-scoped | divergent phantom NPCs per zone |
//! | `thundering-herd` | tick-scoped | mass disconnect, delayed reconnect |

mod cascading_failure;
mod event_flood;
mod latency_spike;
mod memory_pressure;
mod session_crash;
mod slow_leak;
mod split_brain;
mod thundering_herd;

pub use cascading_failure::CascadingZoneFailureFault;
pub use event_flood::EventQueueFloodFault;
pub use latency_spike::LatencySpikeFault;
pub use memory_pressure::MemoryPressureFault;
pub use session_crash::SessionCrashFault;
pub use slow_leak::SlowLeakFault;
pub use split_brain::SplitBrainFault;
pub use thundering_herd::ThunderingHerdFault;

use ashveil_core::Telemetry;

use crate::Fault;

/// All eight built-in scenarios, ready for registration.
#[must_use]
pub fn standard_scenarios(telemetry: &Telemetry) -> Vec<Box<dyn Fault>> {
    vec![
        Box::new(LatencySpikeFault::new()),
        Box::new(SessionCrashFault::new(telemetry.clone())),
        Box::new(EventQueueFloodFault::new(telemetry.clone())),
        Box::new(MemoryPressureFault::new(telemetry.clone())),
        Box::new(CascadingZoneFailureFault::new(telemetry.clone())),
        Box::new(SlowLeakFault::new()),
        Box::new(SplitBrainFault::new(telemetry.clone())),
        Box::new(ThunderingHerdFault::new(telemetry.clone())),
    ]
}

/// Pushes `multiplier` synthetic movement events per resident entity, with
/// positions derived deterministically from `(tick, index, entity id)`.
/// Shared by the flood and cascading scenarios. Returns how many events were
/// injected.
pub(crate) fn flood_zone(zone: &ashveil_core::Zone, current_tick: u64, multiplier: u32) -> usize {
    use ashveil_core::{GameEvent, Position};

    let ids: Vec<u64> = zone.entities().keys().copied().collect();
    let mut index: u64 = 0;
    for &session_id in &ids {
        for _ in 0..multiplier {
            #[allow(clippy::cast_precision_loss)]
            let target = Position::new(
                ((current_tick * 31 + index * 7 + session_id) % 1000) as f32,
                ((current_tick * 13 + index * 11 + session_id) % 1000) as f32,
                0.0,
            );
            zone.push_event(GameEvent::Movement { session_id, target });
            index += 1;
        }
    }
    ids.len() * multiplier as usize
}
