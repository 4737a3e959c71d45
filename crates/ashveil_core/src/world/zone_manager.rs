//! # Zone Manager
//!
//! Hub-and-spoke coordinator for all zones: owns the session→zone index,
//! routes drained events to per-zone queues, performs state-preserving zone
//! transfers, and ticks every zone in ascending id order.
//!
//! Separate from [`Zone`] because routing and transfer are cross-zone
//! concerns, and because aggregating per-zone tick results (including error
//! counts) belongs above the isolation boundary.

use std::collections::{BTreeMap, HashMap};

use serde_json::json;
use thiserror::Error;

use crate::events::GameEvent;
use crate::telemetry::Telemetry;
use crate::world::zone::DuplicateEntity;
use crate::world::{Entity, Zone, ZoneConfig, ZoneId, ZoneTickResult, NO_ZONE};

/// Failures of coordinator operations. Local results, never panics: the
/// caller logs and carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// Referenced a zone id with no zone behind it.
    #[error("zone {0} does not exist")]
    ZoneNotFound(ZoneId),

    /// Session is already placed in a zone.
    #[error("session {session_id} already assigned to zone {zone_id}")]
    SessionAlreadyAssigned {
        /// The session in question.
        session_id: u64,
        /// Where it currently lives.
        zone_id: ZoneId,
    },

    /// Session has no zone assignment.
    #[error("session {0} is not assigned to any zone")]
    SessionNotAssigned(u64),

    /// The zone already contains an entity with this id.
    #[error("zone {zone_id} already contains entity {session_id}")]
    EntityCollision {
        /// The colliding id.
        session_id: u64,
        /// The zone that rejected it.
        zone_id: ZoneId,
    },

    /// Transfer target rejected the entity; it was rolled back to the
    /// source zone.
    #[error("transfer of session {session_id} to zone {target_zone_id} rejected")]
    TransferRejected {
        /// The session being moved.
        session_id: u64,
        /// The zone that rejected it.
        target_zone_id: ZoneId,
    },
}

/// Aggregated results from [`ZoneManager::tick_all`].
#[derive(Debug, Default)]
pub struct ZoneManagerTickResult {
    /// The tick number.
    pub tick: u64,
    /// Number of zones ticked.
    pub zones_ticked: usize,
    /// Events processed across all zones.
    pub total_events: usize,
    /// Zones whose tick failed.
    pub zones_with_errors: usize,
    /// Per-zone results, in zone-id order.
    pub zone_results: Vec<ZoneTickResult>,
}

/// Owns all zones and the session→zone index.
pub struct ZoneManager {
    zones: BTreeMap<ZoneId, Zone>,
    session_zones: HashMap<u64, ZoneId>,
    telemetry: Telemetry,
}

impl ZoneManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(telemetry: Telemetry) -> Self {
        Self { zones: BTreeMap::new(), session_zones: HashMap::new(), telemetry }
    }

    /// Creates a zone and returns its id.
    pub fn create_zone(&mut self, config: ZoneConfig) -> ZoneId {
        let id = config.zone_id;
        let zone = Zone::new(config, self.telemetry.clone());
        self.zones.insert(id, zone);
        id
    }

    /// Shared access to a zone.
    #[must_use]
    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(&id)
    }

    /// Mutable access to a zone (hook installation, tests).
    pub fn zone_mut(&mut self, id: ZoneId) -> Option<&mut Zone> {
        self.zones.get_mut(&id)
    }

    /// Number of zones managed.
    #[must_use]
    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    /// Iterates zones in ascending id order.
    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    /// Iterates zones mutably in ascending id order.
    pub fn zones_mut(&mut self) -> impl Iterator<Item = &mut Zone> {
        self.zones.values_mut()
    }

    /// Places a session in a zone, creating a fresh player entity there.
    pub fn assign_session(&mut self, session_id: u64, zone_id: ZoneId) -> Result<(), WorldError> {
        if let Some(&current) = self.session_zones.get(&session_id) {
            return Err(WorldError::SessionAlreadyAssigned { session_id, zone_id: current });
        }
        let zone = self.zones.get_mut(&zone_id).ok_or(WorldError::ZoneNotFound(zone_id))?;
        zone.add_entity(Entity::player(session_id))
            .map_err(|_| WorldError::EntityCollision { session_id, zone_id })?;
        self.session_zones.insert(session_id, zone_id);
        Ok(())
    }

    /// Removes a session's entity from its zone and forgets the mapping.
    pub fn remove_session(&mut self, session_id: u64) -> Result<(), WorldError> {
        let zone_id = self
            .session_zones
            .remove(&session_id)
            .ok_or(WorldError::SessionNotAssigned(session_id))?;
        if let Some(zone) = self.zones.get_mut(&zone_id) {
            zone.remove_entity(session_id);
        }
        Ok(())
    }

    /// Moves a session's entity to another zone, preserving all sub-state.
    ///
    /// On target rejection the still-owned entity is re-inserted into the
    /// source zone and the mapping is left unchanged.
    pub fn transfer_session(
        &mut self,
        session_id: u64,
        target_zone_id: ZoneId,
    ) -> Result<(), WorldError> {
        let source_zone_id = *self
            .session_zones
            .get(&session_id)
            .ok_or(WorldError::SessionNotAssigned(session_id))?;
        if !self.zones.contains_key(&target_zone_id) {
            return Err(WorldError::ZoneNotFound(target_zone_id));
        }

        let entity = self
            .zones
            .get_mut(&source_zone_id)
            .ok_or(WorldError::ZoneNotFound(source_zone_id))?
            .take_entity(session_id)
            .ok_or(WorldError::SessionNotAssigned(session_id))?;

        let target = self
            .zones
            .get_mut(&target_zone_id)
            .ok_or(WorldError::ZoneNotFound(target_zone_id))?;
        if let Err(DuplicateEntity(entity)) = target.add_entity(entity) {
            // The id vacated the source a moment ago, so this cannot collide.
            if let Some(source) = self.zones.get_mut(&source_zone_id) {
                let _ = source.add_entity(entity);
            }
            return Err(WorldError::TransferRejected { session_id, target_zone_id });
        }

        self.session_zones.insert(session_id, target_zone_id);
        Ok(())
    }

    /// Which zone a session is assigned to; [`NO_ZONE`] if none.
    #[must_use]
    pub fn session_zone(&self, session_id: u64) -> ZoneId {
        self.session_zones.get(&session_id).copied().unwrap_or(NO_ZONE)
    }

    /// Routes a drained batch to per-zone queues by session id.
    ///
    /// Events for unassigned sessions are dropped with an error record.
    /// Returns the number routed.
    pub fn route_events(&mut self, events: Vec<GameEvent>) -> usize {
        let mut routed = 0;
        for event in events {
            let session_id = event.session_id();
            let Some(&zone_id) = self.session_zones.get(&session_id) else {
                self.telemetry.error(
                    "zone_manager",
                    "Event for unassigned session dropped",
                    json!({ "session_id": session_id, "event_type": event.kind() }),
                );
                continue;
            };
            if let Some(zone) = self.zones.get(&zone_id) {
                zone.push_event(event);
                routed += 1;
            }
        }
        routed
    }

    /// Ticks every zone in ascending id order, aggregating results.
    pub fn tick_all(&mut self, current_tick: u64) -> ZoneManagerTickResult {
        let mut result = ZoneManagerTickResult { tick: current_tick, ..Default::default() };
        for zone in self.zones.values_mut() {
            let zone_result = zone.tick(current_tick);
            if zone_result.had_error {
                result.zones_with_errors += 1;
            }
            result.total_events += zone_result.events_processed;
            result.zones_ticked += 1;
            result.zone_results.push(zone_result);
        }
        result
    }
}
