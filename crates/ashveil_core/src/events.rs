//! # Game Events
//!
//! Inputs that flow from the network threads into the tick pipeline. The set
//! is closed (movement, spell cast, combat), so events are a tagged enum and
//! the pipeline phases dispatch on the tag — no virtual dispatch.
//!
//! Events are single-owner values: the producer relinquishes them into a
//! [`crate::DrainQueue`], the consuming zone drains them as a batch.

use crate::world::Position;

/// Damage classification; selects which mitigation stat applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DamageType {
    /// Mitigated by armor.
    Physical,
    /// Mitigated by resistance.
    Magical,
}

/// Spell-cast payloads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpellAction {
    /// Begin a new cast. `cast_time_ticks == 0` means an instant cast.
    CastStart {
        /// Which spell is being cast (never 0 for a valid cast).
        spell_id: u32,
        /// Ticks until completion; 0 completes within the same tick.
        cast_time_ticks: u32,
    },
    /// Cancel whatever the originating session is casting.
    Interrupt,
}

/// Combat payloads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CombatAction {
    /// Deal damage to a target.
    Attack {
        /// The entity being attacked.
        target_id: u64,
        /// Damage before mitigation.
        base_damage: i32,
        /// Physical or magical.
        damage_type: DamageType,
    },
}

/// A single input event, tagged with its originating session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GameEvent {
    /// Position update for the session's entity.
    Movement {
        /// Originating session.
        session_id: u64,
        /// Where the entity wants to be.
        target: Position,
    },
    /// Cast initiation or interruption.
    SpellCast {
        /// Originating session.
        session_id: u64,
        /// What to do.
        action: SpellAction,
    },
    /// Attack against another entity.
    Combat {
        /// Originating session (the attacker).
        session_id: u64,
        /// What to do.
        action: CombatAction,
    },
}

impl GameEvent {
    /// The session that originated this event.
    #[must_use]
    pub fn session_id(&self) -> u64 {
        match *self {
            Self::Movement { session_id, .. }
            | Self::SpellCast { session_id, .. }
            | Self::Combat { session_id, .. } => session_id,
        }
    }

    /// The event's type tag as a wire/telemetry string.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Movement { .. } => "movement",
            Self::SpellCast { .. } => "spell_cast",
            Self::Combat { .. } => "combat",
        }
    }
}
