//! # Spell-Cast Phase
//!
//! Five ordered steps per tick:
//!
//! 1. Cancel casts whose owner moved (flag set by a *previous* tick's
//!    movement — step 5 clears the flag, so a movement and a brand-new cast
//!    in the same tick do not interrupt each other).
//! 2. Apply explicit interrupt events.
//! 3. Advance cast timers; complete casts that reach zero.
//! 4. Start new casts, subject to the global cooldown.
//! 5. Clear `moved_this_tick` on every entity.
//!
//! The instant-cast path (`cast_time_ticks == 0`) counts both a start and a
//! completion in the same tick and never sets `is_casting`. That asymmetry
//! is part of the contract, not an oversight.

use std::collections::BTreeMap;

use serde_json::json;

use crate::events::{GameEvent, SpellAction};
use crate::telemetry::Telemetry;
use crate::world::Entity;
use crate::GLOBAL_COOLDOWN_TICKS;

/// Aggregated spell-phase counters for telemetry and testing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpellCastResult {
    /// New casts initiated this tick (instant casts included).
    pub casts_started: usize,
    /// Casts that finished this tick (instant casts included).
    pub casts_completed: usize,
    /// Casts cancelled by movement or an interrupt event.
    pub casts_interrupted: usize,
    /// Cast attempts rejected because the GCD had not expired.
    pub gcd_blocked: usize,
}

/// Stateless spell-phase processor.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpellCastProcessor;

impl SpellCastProcessor {
    /// Runs the five spell-cast steps over the batch and entity map.
    pub fn process(
        &self,
        events: &[GameEvent],
        entities: &mut BTreeMap<u64, Entity>,
        current_tick: u64,
        telemetry: &Telemetry,
    ) -> SpellCastResult {
        let mut result = SpellCastResult::default();

        // Step 1: movement cancels in-progress casts.
        for entity in entities.values_mut() {
            if entity.cast.moved_this_tick && entity.cast.is_casting {
                let spell_id = entity.cast.spell_id;
                entity.cast.clear_cast();
                result.casts_interrupted += 1;
                telemetry.event(
                    "spellcast",
                    "Cast interrupted",
                    json!({
                        "session_id": entity.id,
                        "spell_id": spell_id,
                        "reason": "movement",
                    }),
                );
            }
        }

        // Step 2: explicit interrupts. Interrupting a non-caster is a no-op.
        for event in events {
            let GameEvent::SpellCast { session_id, action: SpellAction::Interrupt } = event else {
                continue;
            };
            let Some(entity) = entities.get_mut(session_id) else { continue };
            if entity.cast.is_casting {
                let spell_id = entity.cast.spell_id;
                entity.cast.clear_cast();
                result.casts_interrupted += 1;
                telemetry.event(
                    "spellcast",
                    "Cast interrupted",
                    json!({
                        "session_id": session_id,
                        "spell_id": spell_id,
                        "reason": "interrupt",
                    }),
                );
            }
        }

        // Step 3: advance timers, completing casts that reach zero.
        for entity in entities.values_mut() {
            if !entity.cast.is_casting {
                continue;
            }
            entity.cast.cast_ticks_remaining -= 1;
            if entity.cast.cast_ticks_remaining == 0 {
                let spell_id = entity.cast.spell_id;
                entity.cast.is_casting = false;
                entity.cast.spell_id = 0;
                result.casts_completed += 1;
                telemetry.event(
                    "spellcast",
                    "Cast completed",
                    json!({ "session_id": entity.id, "spell_id": spell_id }),
                );
            }
        }

        // Step 4: start new casts.
        for event in events {
            let GameEvent::SpellCast {
                session_id,
                action: SpellAction::CastStart { spell_id, cast_time_ticks },
            } = event
            else {
                continue;
            };
            let Some(entity) = entities.get_mut(session_id) else { continue };

            // Strict '>' so a cast on the exact expiry tick proceeds.
            if entity.cast.gcd_expires_tick > current_tick {
                result.gcd_blocked += 1;
                telemetry.event(
                    "spellcast",
                    "Cast blocked by global cooldown",
                    json!({
                        "session_id": session_id,
                        "spell_id": spell_id,
                        "gcd_expires_tick": entity.cast.gcd_expires_tick,
                    }),
                );
                continue;
            }
            entity.cast.gcd_expires_tick = current_tick + u64::from(GLOBAL_COOLDOWN_TICKS);

            if *cast_time_ticks == 0 {
                // Instant cast: starts and completes without ever channeling.
                result.casts_started += 1;
                result.casts_completed += 1;
                telemetry.event(
                    "spellcast",
                    "Cast started",
                    json!({ "session_id": session_id, "spell_id": spell_id, "instant": true }),
                );
                telemetry.event(
                    "spellcast",
                    "Cast completed",
                    json!({ "session_id": session_id, "spell_id": spell_id, "instant": true }),
                );
            } else {
                entity.cast.is_casting = true;
                entity.cast.spell_id = *spell_id;
                entity.cast.cast_ticks_remaining = *cast_time_ticks;
                result.casts_started += 1;
                telemetry.event(
                    "spellcast",
                    "Cast started",
                    json!({
                        "session_id": session_id,
                        "spell_id": spell_id,
                        "cast_time_ticks": cast_time_ticks,
                    }),
                );
            }
        }

        // Step 5: the movement flag only ever lives for one tick.
        for entity in entities.values_mut() {
            entity.cast.moved_this_tick = false;
        }

        result
    }
}
