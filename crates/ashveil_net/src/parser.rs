//! # Wire Parser
//!
//! Deserializes client JSON objects into [`GameEvent`]s. Pure functions, no
//! I/O: the game-socket reader calls [`parse_event`] after line framing, and
//! drops anything malformed with a warning — a bad payload never reaches the
//! simulation thread.

use ashveil_core::{CombatAction, DamageType, GameEvent, Position, SpellAction};
use serde_json::Value;
use thiserror::Error;

/// Why a payload was rejected. Malformed input is dropped, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A required field is missing or has the wrong JSON type.
    #[error("missing or invalid field '{0}'")]
    Field(&'static str),

    /// The top-level `type` value is not one of the three event kinds.
    #[error("unknown event type '{0}'")]
    UnknownType(String),

    /// The `action` value is not valid for this event kind.
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// The `damage_type` value is neither PHYSICAL nor MAGICAL.
    #[error("unknown damage type '{0}'")]
    UnknownDamageType(String),
}

/// Parses one JSON object into a [`GameEvent`].
pub fn parse_event(value: &Value) -> Result<GameEvent, ParseError> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ParseError::Field("type"))?;
    let session_id = value
        .get("session_id")
        .and_then(Value::as_u64)
        .ok_or(ParseError::Field("session_id"))?;

    match kind {
        "movement" => parse_movement(value, session_id),
        "spell_cast" => parse_spell_cast(value, session_id),
        "combat" => parse_combat(value, session_id),
        other => Err(ParseError::UnknownType(other.to_string())),
    }
}

fn field_f32(value: &Value, name: &'static str) -> Result<f32, ParseError> {
    #[allow(clippy::cast_possible_truncation)]
    value.get(name).and_then(Value::as_f64).map(|v| v as f32).ok_or(ParseError::Field(name))
}

fn parse_movement(value: &Value, session_id: u64) -> Result<GameEvent, ParseError> {
    let position = value.get("position").ok_or(ParseError::Field("position"))?;
    let target = Position::new(
        field_f32(position, "x")?,
        field_f32(position, "y")?,
        field_f32(position, "z")?,
    );
    Ok(GameEvent::Movement { session_id, target })
}

fn parse_spell_cast(value: &Value, session_id: u64) -> Result<GameEvent, ParseError> {
    let action = value
        .get("action")
        .and_then(Value::as_str)
        .ok_or(ParseError::Field("action"))?;
    match action {
        "CAST_START" => {
            let spell_id = value
                .get("spell_id")
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or(ParseError::Field("spell_id"))?;
            let cast_time_ticks = value
                .get("cast_time_ticks")
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or(ParseError::Field("cast_time_ticks"))?;
            Ok(GameEvent::SpellCast {
                session_id,
                action: SpellAction::CastStart { spell_id, cast_time_ticks },
            })
        }
        "INTERRUPT" => Ok(GameEvent::SpellCast { session_id, action: SpellAction::Interrupt }),
        other => Err(ParseError::UnknownAction(other.to_string())),
    }
}

fn parse_combat(value: &Value, session_id: u64) -> Result<GameEvent, ParseError> {
    let action = value
        .get("action")
        .and_then(Value::as_str)
        .ok_or(ParseError::Field("action"))?;
    if action != "ATTACK" {
        return Err(ParseError::UnknownAction(action.to_string()));
    }

    let target_id = value
        .get("target_session_id")
        .and_then(Value::as_u64)
        .ok_or(ParseError::Field("target_session_id"))?;
    let base_damage = value
        .get("base_damage")
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
        .ok_or(ParseError::Field("base_damage"))?;
    let damage_type = match value
        .get("damage_type")
        .and_then(Value::as_str)
        .ok_or(ParseError::Field("damage_type"))?
    {
        "PHYSICAL" => DamageType::Physical,
        "MAGICAL" => DamageType::Magical,
        other => return Err(ParseError::UnknownDamageType(other.to_string())),
    };

    Ok(GameEvent::Combat {
        session_id,
        action: CombatAction::Attack { target_id, base_damage, damage_type },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_movement() {
        let event = parse_event(&json!({
            "type": "movement",
            "session_id": 100,
            "position": { "x": 5.0, "y": 10.0, "z": 15.0 },
        }))
        .unwrap();

        assert_eq!(
            event,
            GameEvent::Movement { session_id: 100, target: Position::new(5.0, 10.0, 15.0) }
        );
    }

    #[test]
    fn parses_cast_start_and_interrupt() {
        let start = parse_event(&json!({
            "type": "spell_cast",
            "session_id": 7,
            "action": "CAST_START",
            "spell_id": 42,
            "cast_time_ticks": 20,
        }))
        .unwrap();
        assert_eq!(
            start,
            GameEvent::SpellCast {
                session_id: 7,
                action: SpellAction::CastStart { spell_id: 42, cast_time_ticks: 20 },
            }
        );

        let interrupt = parse_event(&json!({
            "type": "spell_cast",
            "session_id": 7,
            "action": "INTERRUPT",
        }))
        .unwrap();
        assert_eq!(
            interrupt,
            GameEvent::SpellCast { session_id: 7, action: SpellAction::Interrupt }
        );
    }

    #[test]
    fn parses_attack() {
        let event = parse_event(&json!({
            "type": "combat",
            "session_id": 1,
            "action": "ATTACK",
            "target_session_id": 2,
            "base_damage": 40,
            "damage_type": "PHYSICAL",
        }))
        .unwrap();

        assert_eq!(
            event,
            GameEvent::Combat {
                session_id: 1,
                action: CombatAction::Attack {
                    target_id: 2,
                    base_damage: 40,
                    damage_type: DamageType::Physical,
                },
            }
        );
    }

    #[test]
    fn missing_fields_are_named() {
        let err = parse_event(&json!({ "type": "movement" })).unwrap_err();
        assert_eq!(err, ParseError::Field("session_id"));

        let err = parse_event(&json!({
            "type": "movement",
            "session_id": 1,
        }))
        .unwrap_err();
        assert_eq!(err, ParseError::Field("position"));

        let err = parse_event(&json!({
            "type": "spell_cast",
            "session_id": 1,
            "action": "CAST_START",
            "spell_id": 3,
        }))
        .unwrap_err();
        assert_eq!(err, ParseError::Field("cast_time_ticks"));
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        let err = parse_event(&json!({ "type": "teleport", "session_id": 1 })).unwrap_err();
        assert_eq!(err, ParseError::UnknownType("teleport".into()));

        let err = parse_event(&json!({
            "type": "combat",
            "session_id": 1,
            "action": "ATTACK",
            "target_session_id": 2,
            "base_damage": 1,
            "damage_type": "CHAOS",
        }))
        .unwrap_err();
        assert_eq!(err, ParseError::UnknownDamageType("CHAOS".into()));

        let err = parse_event(&json!({
            "type": "spell_cast",
            "session_id": 1,
            "action": "CHANNEL",
        }))
        .unwrap_err();
        assert_eq!(err, ParseError::UnknownAction("CHANNEL".into()));
    }
}
