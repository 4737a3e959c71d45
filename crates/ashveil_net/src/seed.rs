//! # World Seeding
//!
//! The zones and NPC populations a server starts with. NPC ids live in the
//! 1_000_000+ range so they never collide with player session ids or with
//! split-brain phantoms (2_000_001+).

use ashveil_core::{Entity, ZoneConfig, ZoneId, ZoneManager};

/// One NPC to place at zone creation.
#[derive(Clone, Debug)]
pub struct NpcSeed {
    /// World-unique entity id.
    pub id: u64,
    /// Starting and maximum health.
    pub health: i32,
    /// Physical mitigation.
    pub armor: f32,
    /// Auto-attack damage per tick against the highest-threat target.
    pub attack_damage: i32,
}

/// One zone to create at startup.
#[derive(Clone, Debug)]
pub struct ZoneSeed {
    /// Zone id (never 0).
    pub zone_id: ZoneId,
    /// Display name.
    pub name: &'static str,
    /// Resident NPCs.
    pub npcs: Vec<NpcSeed>,
}

/// The default world: two zones, one NPC each.
#[must_use]
pub fn default_seeds() -> Vec<ZoneSeed> {
    vec![
        ZoneSeed {
            zone_id: 1,
            name: "Thornwood Vale",
            npcs: vec![NpcSeed { id: 1_000_001, health: 150, armor: 0.25, attack_damage: 15 }],
        },
        ZoneSeed {
            zone_id: 2,
            name: "Cinder Flats",
            npcs: vec![NpcSeed { id: 1_000_002, health: 100, armor: 0.10, attack_damage: 10 }],
        },
    ]
}

/// Creates the seeded zones and populates their NPCs. Returns the zone ids
/// in seed order, used for round-robin session placement.
pub fn apply_seeds(manager: &mut ZoneManager, seeds: &[ZoneSeed]) -> Vec<ZoneId> {
    let mut zone_ids = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let zone_id =
            manager.create_zone(ZoneConfig { zone_id: seed.zone_id, name: seed.name.to_string() });
        zone_ids.push(zone_id);
        for npc_seed in &seed.npcs {
            let mut npc = Entity::npc(npc_seed.id);
            npc.combat.health = npc_seed.health;
            npc.combat.max_health = npc_seed.health;
            npc.combat.armor = npc_seed.armor;
            npc.combat.base_attack_damage = npc_seed.attack_damage;
            if let Some(zone) = manager.zone_mut(zone_id) {
                let _ = zone.add_entity(npc);
            }
        }
    }
    zone_ids
}
