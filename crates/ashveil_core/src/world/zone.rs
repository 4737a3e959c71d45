//! # Zone
//!
//! A self-contained simulation region: its own entity map, its own event
//! queue, and the three-phase pipeline, all executed inside an isolation
//! guard. A failing tick (a panicking hook or processor) never escapes the
//! zone — it becomes a state transition instead:
//!
//! ```text
//! Active ──failure──► Crashed ──ok──► Degraded ──ok──► Active
//! ```
//!
//! The recovery arc is deliberately two successful ticks long so operators
//! can watch zones climb back to health in telemetry.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::events::GameEvent;
use crate::pipeline::{CombatProcessor, CombatResult, MovementProcessor, SpellCastProcessor, SpellCastResult};
use crate::queue::DrainQueue;
use crate::telemetry::Telemetry;
use crate::world::Entity;

/// Unique identifier for a zone instance.
pub type ZoneId = u32;

/// Sentinel meaning "no zone assignment".
pub const NO_ZONE: ZoneId = 0;

/// Runtime state of a zone, visible in health telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneState {
    /// Normal operation.
    Active,
    /// One successful tick since a crash; one more to full health.
    Degraded,
    /// The last tick failed.
    Crashed,
}

impl ZoneState {
    /// Telemetry string for this state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Degraded => "degraded",
            Self::Crashed => "crashed",
        }
    }
}

/// Configuration for creating a zone.
#[derive(Clone, Debug)]
pub struct ZoneConfig {
    /// Unique zone identifier (never [`NO_ZONE`]).
    pub zone_id: ZoneId,
    /// Human-readable name, e.g. "Thornwood Vale".
    pub name: String,
}

/// Hook invoked inside the isolation guard, before or after the pipeline.
///
/// The hook receives the zone itself so fault scenarios can push events or
/// mutate entities. A panicking hook is caught by the guard.
pub type ZoneHook = Box<dyn FnMut(&mut Zone) + Send>;

/// Result of a single [`Zone::tick`], for aggregation and testing.
#[derive(Debug, Default)]
pub struct ZoneTickResult {
    /// Which zone was ticked.
    pub zone_id: ZoneId,
    /// The tick number.
    pub tick: u64,
    /// Events drained from the zone queue.
    pub events_processed: usize,
    /// Distinct sessions whose positions changed.
    pub entities_moved: usize,
    /// Spell-phase counters.
    pub spell: SpellCastResult,
    /// Combat-phase counters.
    pub combat: CombatResult,
    /// Wall-clock duration of this tick in milliseconds.
    pub duration_ms: f64,
    /// Whether the isolation guard caught a failure.
    pub had_error: bool,
    /// Captured failure message, when `had_error`.
    pub error_message: Option<String>,
}

/// Health snapshot for monitoring.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZoneHealth {
    /// Which zone.
    pub zone_id: ZoneId,
    /// Current state.
    pub state: ZoneState,
    /// Ticks executed, failures included.
    pub total_ticks: u64,
    /// Failed ticks since creation.
    pub error_count: u64,
    /// Entities currently resident.
    pub entity_count: usize,
    /// Events waiting in the zone queue.
    pub event_queue_depth: usize,
    /// Duration of the most recent tick in milliseconds.
    pub last_tick_duration_ms: f64,
}

/// Attempted to add an entity whose id is already present.
///
/// Carries the rejected entity back to the caller, which still owns it —
/// this is what makes the transfer rollback expressible without a re-take.
#[derive(Error, Debug)]
#[error("entity {} already present in zone", .0.id)]
pub struct DuplicateEntity(pub Entity);

/// One simulation region with an isolation boundary around its tick.
pub struct Zone {
    config: ZoneConfig,
    state: ZoneState,
    total_ticks: u64,
    error_count: u64,
    last_tick_duration_ms: f64,
    entities: BTreeMap<u64, Entity>,
    queue: DrainQueue<GameEvent>,
    movement: MovementProcessor,
    spellcast: SpellCastProcessor,
    combat: CombatProcessor,
    pre_tick_hook: Option<ZoneHook>,
    post_tick_hook: Option<ZoneHook>,
    telemetry: Telemetry,
}

impl Zone {
    /// Creates an empty, active zone.
    #[must_use]
    pub fn new(config: ZoneConfig, telemetry: Telemetry) -> Self {
        Self {
            config,
            state: ZoneState::Active,
            total_ticks: 0,
            error_count: 0,
            last_tick_duration_ms: 0.0,
            entities: BTreeMap::new(),
            queue: DrainQueue::new(),
            movement: MovementProcessor,
            spellcast: SpellCastProcessor,
            combat: CombatProcessor,
            pre_tick_hook: None,
            post_tick_hook: None,
            telemetry,
        }
    }

    /// The zone's unique identifier.
    #[must_use]
    pub fn zone_id(&self) -> ZoneId {
        self.config.zone_id
    }

    /// The zone's human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current runtime state.
    #[must_use]
    pub fn state(&self) -> ZoneState {
        self.state
    }

    // --- Entity management ---

    /// Adds an entity. Fails if the id is already present, handing the
    /// entity back inside the error.
    pub fn add_entity(&mut self, entity: Entity) -> Result<(), DuplicateEntity> {
        if self.entities.contains_key(&entity.id) {
            return Err(DuplicateEntity(entity));
        }
        self.entities.insert(entity.id, entity);
        Ok(())
    }

    /// Removes an entity by id. Returns whether it was present.
    pub fn remove_entity(&mut self, id: u64) -> bool {
        self.entities.remove(&id).is_some()
    }

    /// Removes and returns an entity with all sub-state intact (used by
    /// zone transfer).
    pub fn take_entity(&mut self, id: u64) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Whether an entity with this id is resident.
    #[must_use]
    pub fn has_entity(&self, id: u64) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of resident entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Immutable view of the entity map, in ascending id order.
    #[must_use]
    pub fn entities(&self) -> &BTreeMap<u64, Entity> {
        &self.entities
    }

    // --- Event delivery ---

    /// Pushes an event into this zone's queue. Thread-safe; callable from
    /// producer handles on any thread.
    pub fn push_event(&self, event: GameEvent) {
        self.queue.push(event);
    }

    /// Current queue depth.
    #[must_use]
    pub fn event_queue_depth(&self) -> usize {
        self.queue.len()
    }

    // --- Hooks ---

    /// Installs the pre-tick hook (fault-injection dispatch point).
    pub fn set_pre_tick_hook(&mut self, hook: ZoneHook) {
        self.pre_tick_hook = Some(hook);
    }

    /// Installs the post-tick hook.
    pub fn set_post_tick_hook(&mut self, hook: ZoneHook) {
        self.post_tick_hook = Some(hook);
    }

    /// Clears both hooks. Called during tear-down so closures borrowing the
    /// registry are dropped before the registry itself.
    pub fn clear_hooks(&mut self) {
        self.pre_tick_hook = None;
        self.post_tick_hook = None;
    }

    // --- Tick ---

    /// Executes one tick: pre-hook → drain → movement → spell-cast → combat
    /// → post-hook, all inside the isolation guard.
    ///
    /// `total_ticks` advances whether or not the tick succeeded. A caught
    /// failure marks the zone Crashed; each subsequent successful tick then
    /// advances the recovery arc one step.
    pub fn tick(&mut self, current_tick: u64) -> ZoneTickResult {
        let start = Instant::now();
        let mut result = ZoneTickResult {
            zone_id: self.config.zone_id,
            tick: current_tick,
            ..ZoneTickResult::default()
        };

        // Hooks are taken out for the duration of the tick so they can
        // receive `&mut Zone` without aliasing the stored slot, and restored
        // afterwards — including on the unwind path.
        let mut pre = self.pre_tick_hook.take();
        let mut post = self.post_tick_hook.take();
        let telemetry = self.telemetry.clone();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            if let Some(hook) = pre.as_mut() {
                hook(self);
            }

            let events = self.queue.drain();
            let events_processed = events.len();

            let (movement, spellcast, combat) = (self.movement, self.spellcast, self.combat);
            let entities_moved = movement.process(&events, &mut self.entities, &telemetry);
            let spell = spellcast.process(&events, &mut self.entities, current_tick, &telemetry);
            let combat = combat.process(&events, &mut self.entities, &telemetry);

            if let Some(hook) = post.as_mut() {
                hook(self);
            }

            (events_processed, entities_moved, spell, combat)
        }));

        self.pre_tick_hook = pre;
        self.post_tick_hook = post;

        match outcome {
            Ok((events_processed, entities_moved, spell, combat)) => {
                result.events_processed = events_processed;
                result.entities_moved = entities_moved;
                result.spell = spell;
                result.combat = combat;

                self.state = match self.state {
                    ZoneState::Crashed => ZoneState::Degraded,
                    ZoneState::Degraded | ZoneState::Active => ZoneState::Active,
                };
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                result.had_error = true;
                result.error_message = Some(message.clone());
                self.state = ZoneState::Crashed;
                self.error_count += 1;

                self.telemetry.error(
                    "zone",
                    "Zone tick failure",
                    json!({
                        "zone_id": self.config.zone_id,
                        "zone_name": self.config.name,
                        "tick": current_tick,
                        "error": message,
                    }),
                );
            }
        }

        self.total_ticks += 1;
        self.last_tick_duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        result.duration_ms = self.last_tick_duration_ms;

        if !result.had_error {
            self.telemetry.metric(
                "zone",
                "Zone tick completed",
                json!({
                    "zone_id": self.config.zone_id,
                    "zone_name": self.config.name,
                    "tick": current_tick,
                    "events_processed": result.events_processed,
                    "entities_moved": result.entities_moved,
                    "duration_ms": result.duration_ms,
                    "casts_started": result.spell.casts_started,
                    "casts_completed": result.spell.casts_completed,
                    "casts_interrupted": result.spell.casts_interrupted,
                    "gcd_blocked": result.spell.gcd_blocked,
                    "attacks_processed": result.combat.attacks_processed,
                    "attacks_missed": result.combat.attacks_missed,
                    "npc_attacks": result.combat.npc_attacks,
                    "total_damage_dealt": result.combat.total_damage_dealt,
                    "kills": result.combat.kills,
                }),
            );
        }

        result
    }

    // --- Health ---

    /// Snapshot of this zone's current health metrics.
    #[must_use]
    pub fn health(&self) -> ZoneHealth {
        ZoneHealth {
            zone_id: self.config.zone_id,
            state: self.state,
            total_ticks: self.total_ticks,
            error_count: self.error_count,
            entity_count: self.entities.len(),
            event_queue_depth: self.queue.len(),
            last_tick_duration_ms: self.last_tick_duration_ms,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SpellAction;
    use crate::world::Position;

    fn zone(id: ZoneId) -> Zone {
        Zone::new(ZoneConfig { zone_id: id, name: format!("Test Zone {id}") }, Telemetry::disabled())
    }

    #[test]
    fn construction_defaults() {
        let zone = zone(1);
        assert_eq!(zone.zone_id(), 1);
        assert_eq!(zone.state(), ZoneState::Active);
        assert_eq!(zone.entity_count(), 0);

        let health = zone.health();
        assert_eq!(health.total_ticks, 0);
        assert_eq!(health.error_count, 0);
        assert_eq!(health.event_queue_depth, 0);
    }

    #[test]
    fn duplicate_add_hands_the_entity_back() {
        let mut zone = zone(1);
        zone.add_entity(Entity::player(100)).unwrap();

        let mut rejected = Entity::player(100);
        rejected.position = Position::new(9.0, 9.0, 9.0);
        let err = zone.add_entity(rejected).unwrap_err();

        // Ownership comes back intact.
        assert_eq!(err.0.id, 100);
        assert_eq!(err.0.position, Position::new(9.0, 9.0, 9.0));
        assert_eq!(zone.entity_count(), 1);
    }

    #[test]
    fn take_entity_preserves_sub_state() {
        let mut zone = zone(1);
        let mut player = Entity::player(100);
        player.position = Position::new(7.0, 8.0, 9.0);
        player.combat.health = 55;
        player.cast.gcd_expires_tick = 31;
        zone.add_entity(player.clone()).unwrap();

        let taken = zone.take_entity(100).unwrap();
        assert_eq!(taken, player);
        assert!(!zone.has_entity(100));
    }

    #[test]
    fn tick_drains_queue_and_runs_pipeline() {
        let mut zone = zone(1);
        zone.add_entity(Entity::player(100)).unwrap();
        zone.push_event(GameEvent::Movement { session_id: 100, target: Position::new(5.0, 10.0, 15.0) });

        let result = zone.tick(1);

        assert_eq!(result.events_processed, 1);
        assert_eq!(result.entities_moved, 1);
        assert_eq!(zone.event_queue_depth(), 0);
        assert_eq!(zone.entities()[&100].position, Position::new(5.0, 10.0, 15.0));
        assert!(!result.had_error);
    }

    #[test]
    fn panicking_hook_crashes_zone_but_not_process() {
        let mut zone = zone(1);
        zone.add_entity(Entity::player(100)).unwrap();
        zone.set_pre_tick_hook(Box::new(|_zone| panic!("injected crash")));

        let result = zone.tick(1);

        assert!(result.had_error);
        assert_eq!(result.error_message.as_deref(), Some("injected crash"));
        assert_eq!(zone.state(), ZoneState::Crashed);
        assert_eq!(zone.health().error_count, 1);
        // The tick still counts and the entity map is intact.
        assert_eq!(zone.health().total_ticks, 1);
        assert_eq!(zone.entity_count(), 1);
    }

    #[test]
    fn recovery_arc_is_two_ticks() {
        let mut zone = zone(1);
        zone.set_pre_tick_hook(Box::new(|_zone| panic!("once")));
        zone.tick(1);
        assert_eq!(zone.state(), ZoneState::Crashed);

        zone.clear_hooks();
        zone.tick(2);
        assert_eq!(zone.state(), ZoneState::Degraded);
        zone.tick(3);
        assert_eq!(zone.state(), ZoneState::Active);
        zone.tick(4);
        assert_eq!(zone.state(), ZoneState::Active);
        assert_eq!(zone.health().total_ticks, 4);
    }

    #[test]
    fn hook_survives_its_own_panic() {
        let mut zone = zone(1);
        zone.set_pre_tick_hook(Box::new(|_zone| panic!("every tick")));

        zone.tick(1);
        let second = zone.tick(2);

        // Hook was restored after the unwind and fired again.
        assert!(second.had_error);
        assert_eq!(zone.health().error_count, 2);
    }

    #[test]
    fn hooks_can_mutate_the_zone() {
        let mut zone = zone(1);
        zone.add_entity(Entity::player(100)).unwrap();
        zone.set_pre_tick_hook(Box::new(|zone| {
            zone.push_event(GameEvent::Movement {
                session_id: 100,
                target: Position::new(1.0, 2.0, 3.0),
            });
        }));

        let result = zone.tick(1);

        assert_eq!(result.events_processed, 1);
        assert_eq!(zone.entities()[&100].position, Position::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn post_tick_hook_sees_pipeline_results() {
        let mut zone = zone(1);
        zone.add_entity(Entity::player(100)).unwrap();
        zone.push_event(GameEvent::Movement { session_id: 100, target: Position::new(3.0, 0.0, 0.0) });
        zone.set_post_tick_hook(Box::new(|zone| {
            // Runs after the pipeline: the position is already applied.
            assert_eq!(zone.entities()[&100].position, Position::new(3.0, 0.0, 0.0));
        }));

        let result = zone.tick(1);
        assert!(!result.had_error);
        assert_eq!(result.entities_moved, 1);
    }

    #[test]
    fn failed_tick_emits_error_not_metric() {
        let (telemetry, buffer) = Telemetry::memory();
        let mut zone = Zone::new(
            ZoneConfig { zone_id: 3, name: "Guarded".into() },
            telemetry,
        );
        zone.set_pre_tick_hook(Box::new(|_zone| panic!("boom")));

        zone.tick(7);

        let records = buffer.records();
        assert!(records.iter().any(|r| r["type"] == "error" && r["component"] == "zone"));
        assert!(!records.iter().any(|r| r["type"] == "metric" && r["component"] == "zone"));
    }

    #[test]
    fn crashed_zone_still_queues_events() {
        let mut zone = zone(1);
        zone.add_entity(Entity::player(100)).unwrap();
        zone.set_pre_tick_hook(Box::new(|_zone| panic!("down")));
        zone.tick(1);

        // Events pushed while crashed are not lost...
        zone.push_event(GameEvent::SpellCast { session_id: 100, action: SpellAction::Interrupt });
        assert_eq!(zone.event_queue_depth(), 1);

        // ...and are processed once the zone ticks successfully again.
        zone.clear_hooks();
        let result = zone.tick(2);
        assert_eq!(result.events_processed, 1);
    }
}
