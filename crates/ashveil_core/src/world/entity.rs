//! # Entity State
//!
//! Plain value types for everything a zone tracks per entity: position,
//! spell-casting progress, and combat state. Mutated only by the pipeline
//! phases on the simulation thread.

use std::collections::BTreeMap;

use crate::{DEFAULT_HEALTH, DEFAULT_MAX_HEALTH};

/// 3D position in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    /// East-west axis.
    pub x: f32,
    /// North-south axis.
    pub y: f32,
    /// Vertical axis.
    pub z: f32,
}

impl Position {
    /// Creates a position from its components.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another position.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Per-entity spell-casting state.
///
/// Invariant: `is_casting` implies `spell_id != 0` and
/// `cast_ticks_remaining >= 1`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CastState {
    /// Whether a spell is being channeled.
    pub is_casting: bool,
    /// The spell being cast (0 = none).
    pub spell_id: u32,
    /// Ticks left until the cast completes.
    pub cast_ticks_remaining: u32,
    /// Absolute tick at which the global cooldown expires (0 = no GCD).
    pub gcd_expires_tick: u64,
    /// Set by the movement phase, consumed by the spell-cast phase, cleared
    /// at the end of each tick.
    pub moved_this_tick: bool,
}

impl CastState {
    /// Clears all active-cast fields. GCD and the movement flag are
    /// untouched.
    pub fn clear_cast(&mut self) {
        self.is_casting = false;
        self.spell_id = 0;
        self.cast_ticks_remaining = 0;
    }
}

/// Per-entity combat state.
///
/// Invariants: `health <= max_health`; `is_alive` iff `health > 0` once
/// damage for a tick has been applied (death flips atomically with the
/// damage that caused it).
#[derive(Clone, Debug, PartialEq)]
pub struct CombatState {
    /// Current health. May go negative on overkill.
    pub health: i32,
    /// Upper bound for `health`.
    pub max_health: i32,
    /// Physical mitigation in `[0, 1]`; clamped to 0.75 at application time.
    pub armor: f32,
    /// Magical mitigation in `[0, 1]`; clamped to 0.75 at application time.
    pub resistance: f32,
    /// Whether the entity is alive.
    pub is_alive: bool,
    /// Auto-attack damage; non-zero only for NPCs.
    pub base_attack_damage: i32,
    /// Damage-as-threat ledger: attacker id → accumulated threat.
    pub threat_table: BTreeMap<u64, f32>,
}

impl Default for CombatState {
    fn default() -> Self {
        Self {
            health: DEFAULT_HEALTH,
            max_health: DEFAULT_MAX_HEALTH,
            armor: 0.0,
            resistance: 0.0,
            is_alive: true,
            base_attack_damage: 0,
            threat_table: BTreeMap::new(),
        }
    }
}

/// Player avatar or server-controlled NPC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    /// Driven by a connected session; id shares the session-id namespace.
    Player,
    /// Server-controlled; id drawn from a disjoint range.
    Npc,
}

/// A single in-world entity, keyed by id inside its zone.
///
/// Player ids equal their session ids; NPC ids start at 1_000_001 and
/// split-brain phantoms at 2_000_001, keeping the namespaces disjoint.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    /// Unique id within the world.
    pub id: u64,
    /// Player or NPC.
    pub kind: EntityKind,
    /// Where the entity is.
    pub position: Position,
    /// Spell-casting progress.
    pub cast: CastState,
    /// Health, mitigation, and threat.
    pub combat: CombatState,
}

impl Entity {
    /// Creates a player entity at the origin with default combat stats.
    #[must_use]
    pub fn player(id: u64) -> Self {
        Self {
            id,
            kind: EntityKind::Player,
            position: Position::default(),
            cast: CastState::default(),
            combat: CombatState::default(),
        }
    }

    /// Creates an NPC entity at the origin with default combat stats.
    #[must_use]
    pub fn npc(id: u64) -> Self {
        Self { kind: EntityKind::Npc, ..Self::player(id) }
    }

    /// Whether this entity is a living NPC that auto-attacks.
    #[must_use]
    pub fn is_attacking_npc(&self) -> bool {
        self.kind == EntityKind::Npc && self.combat.is_alive && self.combat.base_attack_damage > 0
    }
}
