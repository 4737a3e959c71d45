//! # Tick Pipeline
//!
//! The three ordered phases a zone runs over its drained event batch each
//! tick: movement, then spell casting, then combat. The phase order is
//! observable — the spell-cast phase reads the movement flags the movement
//! phase set, and the combat phase sees positions and casts as of this tick.
//!
//! Processors are stateless; all state lives in the zone's entity map. They
//! operate on a borrowed batch and the entity map serially on the simulation
//! thread, so no locking is involved.

mod combat;
mod movement;
mod spellcast;

pub use combat::{CombatProcessor, CombatResult};
pub use movement::MovementProcessor;
pub use spellcast::{SpellCastProcessor, SpellCastResult};
