//! # Combat Phase
//!
//! Three ordered steps per tick:
//!
//! 1. Apply attack events (validate, mitigate, damage, threat, death).
//! 2. NPC auto-attacks against each NPC's highest-threat living target.
//! 3. Threat cleanup: living entities forget dead attackers.
//!
//! Damage is threat, 1:1. Death flips `is_alive` atomically with the damage
//! that caused it, so the `is_alive ⇔ health > 0` invariant holds at every
//! point a failure could unwind the tick.

use std::collections::BTreeMap;

use serde_json::json;

use crate::events::{CombatAction, DamageType, GameEvent};
use crate::telemetry::Telemetry;
use crate::world::Entity;
use crate::MAX_MITIGATION;

/// Aggregated combat-phase counters for telemetry and testing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CombatResult {
    /// Attacks that dealt damage.
    pub attacks_processed: usize,
    /// Attacks skipped: absent or dead attacker/target.
    pub attacks_missed: usize,
    /// Entities killed this tick.
    pub kills: usize,
    /// NPC auto-attacks executed.
    pub npc_attacks: usize,
    /// Sum of all actual damage applied.
    pub total_damage_dealt: i64,
}

/// Outcome of a single damage application.
struct Strike {
    actual_damage: i32,
    killed: bool,
}

/// Stateless combat-phase processor.
#[derive(Clone, Copy, Debug, Default)]
pub struct CombatProcessor;

impl CombatProcessor {
    /// Runs the three combat steps over the batch and entity map.
    pub fn process(
        &self,
        events: &[GameEvent],
        entities: &mut BTreeMap<u64, Entity>,
        telemetry: &Telemetry,
    ) -> CombatResult {
        let mut result = CombatResult::default();

        // Step 1: player attack events.
        for event in events {
            let GameEvent::Combat {
                session_id: attacker_id,
                action: CombatAction::Attack { target_id, base_damage, damage_type },
            } = event
            else {
                continue;
            };

            let attacker_alive =
                entities.get(attacker_id).is_some_and(|e| e.combat.is_alive);
            if !attacker_alive {
                result.attacks_missed += 1;
                continue;
            }

            match strike(entities, *attacker_id, *target_id, *base_damage, *damage_type) {
                Some(hit) => {
                    result.attacks_processed += 1;
                    result.total_damage_dealt += i64::from(hit.actual_damage);
                    if hit.killed {
                        result.kills += 1;
                        telemetry.event(
                            "combat",
                            "Entity died",
                            json!({ "entity_id": target_id, "killer_id": attacker_id }),
                        );
                    }
                }
                None => result.attacks_missed += 1,
            }
        }

        // Step 2: NPC auto-attacks. Each living NPC with accumulated threat
        // swings at its highest-threat living target; first key at the
        // maximum wins ties (ascending id order).
        let npc_ids: Vec<u64> =
            entities.values().filter(|e| e.is_attacking_npc()).map(|e| e.id).collect();
        for npc_id in npc_ids {
            let Some(npc) = entities.get(&npc_id) else { continue };
            if !npc.combat.is_alive {
                // Killed by an earlier auto-attack this tick.
                continue;
            }
            let damage = npc.combat.base_attack_damage;
            let mut target: Option<(u64, f32)> = None;
            for (&candidate, &threat) in &npc.combat.threat_table {
                let alive = entities.get(&candidate).is_some_and(|e| e.combat.is_alive);
                if alive && target.is_none_or(|(_, best)| threat > best) {
                    target = Some((candidate, threat));
                }
            }
            let Some((target_id, _)) = target else { continue };

            if let Some(hit) = strike(entities, npc_id, target_id, damage, DamageType::Physical) {
                result.npc_attacks += 1;
                result.total_damage_dealt += i64::from(hit.actual_damage);
                if hit.killed {
                    result.kills += 1;
                    telemetry.event(
                        "combat",
                        "Entity died",
                        json!({ "entity_id": target_id, "killer_id": npc_id }),
                    );
                }
            }
        }

        // Step 3: threat cleanup — the dead generate no threat and hold none.
        let dead: Vec<u64> =
            entities.values().filter(|e| !e.combat.is_alive).map(|e| e.id).collect();
        for entity in entities.values_mut() {
            if entity.combat.is_alive {
                for id in &dead {
                    entity.combat.threat_table.remove(id);
                }
            }
        }

        result
    }
}

/// Applies one hit to `target_id`, crediting threat to `attacker_id`.
///
/// Returns `None` when the target is absent or already dead (a miss).
fn strike(
    entities: &mut BTreeMap<u64, Entity>,
    attacker_id: u64,
    target_id: u64,
    base_damage: i32,
    damage_type: DamageType,
) -> Option<Strike> {
    let target = entities.get_mut(&target_id)?;
    if !target.combat.is_alive {
        return None;
    }

    let raw = match damage_type {
        DamageType::Physical => target.combat.armor,
        DamageType::Magical => target.combat.resistance,
    };
    let mitigation = raw.clamp(0.0, MAX_MITIGATION);
    #[allow(clippy::cast_possible_truncation)]
    let actual_damage = (base_damage as f32 * (1.0 - mitigation)).round() as i32;

    target.combat.health -= actual_damage;
    *target.combat.threat_table.entry(attacker_id).or_insert(0.0) += actual_damage as f32;

    let killed = target.combat.health <= 0;
    if killed {
        target.combat.is_alive = false;
    }

    Some(Strike { actual_damage, killed })
}
