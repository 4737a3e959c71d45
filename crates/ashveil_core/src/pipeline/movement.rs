//! # Movement Phase
//!
//! Applies position updates from the event batch. Multiple events for one
//! session within a batch resolve last-write-wins by iterating in batch
//! order. Events for unknown sessions are dropped with a telemetry entry.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::json;

use crate::events::GameEvent;
use crate::telemetry::Telemetry;
use crate::world::Entity;

/// Stateless movement-phase processor.
#[derive(Clone, Copy, Debug, Default)]
pub struct MovementProcessor;

impl MovementProcessor {
    /// Applies every movement event in the batch to the entity map.
    ///
    /// Sets `moved_this_tick` on each moved entity (consumed later by the
    /// spell-cast phase). Returns the number of distinct sessions whose
    /// positions changed.
    pub fn process(
        &self,
        events: &[GameEvent],
        entities: &mut BTreeMap<u64, Entity>,
        telemetry: &Telemetry,
    ) -> usize {
        let mut moved = BTreeSet::new();

        for event in events {
            let GameEvent::Movement { session_id, target } = event else {
                continue;
            };
            match entities.get_mut(session_id) {
                Some(entity) => {
                    entity.position = *target;
                    entity.cast.moved_this_tick = true;
                    moved.insert(*session_id);
                }
                None => {
                    telemetry.error(
                        "movement",
                        "Movement event for unknown session dropped",
                        json!({ "session_id": session_id }),
                    );
                }
            }
        }

        moved.len()
    }
}
