//! Maps Home Assistant payloads to [`ObservedState`].
//!
//! The interpreter is pure: it never logs or mutates anything. The session
//! manager decides what each [`Interpretation`] means for logging and for
//! the render throttler.

use dndink_core::ObservedState;
use serde_json::Value;

use crate::protocol::STATE_CHANGED;

/// Outcome of looking at one payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interpretation {
    /// A recognized value for the configured entity.
    State {
        /// Mapped state.
        state: ObservedState,
        /// Raw new value.
        raw: String,
        /// Raw previous value, when the event carries one.
        previous: Option<String>,
    },
    /// Not about the configured entity (or not a state change at all).
    Ignored,
    /// The configured entity was absent from a `get_states` result.
    NotFound,
    /// The payload is missing fields the mapping needs.
    Malformed(String),
    /// The entity reported a value that is neither truthy nor falsy.
    Unrecognized(String),
}

impl Interpretation {
    /// The mapped state, if there is one.
    #[cfg(test)]
    pub(crate) fn state(&self) -> Option<ObservedState> {
        match self {
            Self::State { state, .. } => Some(*state),
            _ => None,
        }
    }
}

/// Payload mapping for one entity.
#[derive(Clone, Debug)]
pub struct StateInterpreter {
    entity_id: String,
}

impl StateInterpreter {
    /// Interpreter for `entity_id`.
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
        }
    }

    /// The monitored entity.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Interpret the `event` object of an `event` message.
    pub fn interpret_event(&self, event: &Value) -> Interpretation {
        if let Some(event_type) = event.get("event_type").and_then(Value::as_str) {
            if event_type != STATE_CHANGED {
                return Interpretation::Ignored;
            }
        }

        let Some(data) = event.get("data").filter(|d| d.is_object()) else {
            return Interpretation::Malformed("event has no data object".into());
        };
        let Some(entity_id) = data.get("entity_id").and_then(Value::as_str) else {
            return Interpretation::Malformed("event data has no entity_id".into());
        };
        if entity_id != self.entity_id {
            return Interpretation::Ignored;
        }

        let new_state = match data.get("new_state") {
            Some(Value::Object(_)) => &data["new_state"],
            Some(Value::Null) => {
                return Interpretation::Malformed("new_state is null (entity removed)".into());
            }
            _ => return Interpretation::Malformed("event data has no new_state object".into()),
        };
        let previous = data
            .get("old_state")
            .and_then(|old| old.get("state"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        map_state_object(new_state, previous)
    }

    /// Interpret the array returned by `get_states`.
    pub fn interpret_states(&self, states: &Value) -> Interpretation {
        let Some(states) = states.as_array() else {
            return Interpretation::Malformed("get_states result is not an array".into());
        };
        states
            .iter()
            .find(|s| s.get("entity_id").and_then(Value::as_str) == Some(self.entity_id.as_str()))
            .map_or(Interpretation::NotFound, |s| map_state_object(s, None))
    }
}

fn map_state_object(state_object: &Value, previous: Option<String>) -> Interpretation {
    let Some(raw) = state_object.get("state").and_then(Value::as_str) else {
        return Interpretation::Malformed("state object has no string state".into());
    };
    match ObservedState::from_entity_value(raw) {
        Some(state) => Interpretation::State {
            state,
            raw: raw.to_owned(),
            previous,
        },
        None => Interpretation::Unrecognized(raw.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    const ENTITY: &str = "input_boolean.dnd_status";

    fn interpreter() -> StateInterpreter {
        StateInterpreter::new(ENTITY)
    }

    fn state_changed(entity: &str, old: Option<&str>, new: &str) -> Value {
        json!({
            "event_type": "state_changed",
            "data": {
                "entity_id": entity,
                "old_state": old.map(|s| json!({"entity_id": entity, "state": s})),
                "new_state": {"entity_id": entity, "state": new},
            },
            "origin": "LOCAL",
        })
    }

    #[test]
    fn on_maps_to_busy_with_previous() {
        let result = interpreter().interpret_event(&state_changed(ENTITY, Some("off"), "on"));
        assert_eq!(
            result,
            Interpretation::State {
                state: ObservedState::Busy,
                raw: "on".into(),
                previous: Some("off".into()),
            }
        );
    }

    #[test]
    fn off_maps_to_free_without_old_state() {
        let result = interpreter().interpret_event(&state_changed(ENTITY, None, "off"));
        assert_eq!(result.state(), Some(ObservedState::Free));
        assert_matches!(result, Interpretation::State { previous: None, .. });
    }

    #[test]
    fn other_entity_is_ignored() {
        let result =
            interpreter().interpret_event(&state_changed("light.kitchen", Some("off"), "on"));
        assert_eq!(result, Interpretation::Ignored);
    }

    #[test]
    fn other_event_type_is_ignored() {
        let event = json!({"event_type": "call_service", "data": {"entity_id": ENTITY}});
        assert_eq!(interpreter().interpret_event(&event), Interpretation::Ignored);
    }

    #[test]
    fn unavailable_is_unrecognized() {
        let result = interpreter().interpret_event(&state_changed(ENTITY, Some("on"), "unavailable"));
        assert_eq!(result, Interpretation::Unrecognized("unavailable".into()));
        assert_eq!(result.state(), None);
    }

    #[test]
    fn missing_data_is_malformed() {
        assert_matches!(
            interpreter().interpret_event(&json!({"event_type": "state_changed"})),
            Interpretation::Malformed(_)
        );
        assert_matches!(
            interpreter().interpret_event(&json!({"data": {"new_state": {"state": "on"}}})),
            Interpretation::Malformed(_)
        );
    }

    #[test]
    fn removed_entity_is_malformed() {
        let event = json!({
            "event_type": "state_changed",
            "data": {"entity_id": ENTITY, "old_state": {"state": "on"}, "new_state": null},
        });
        assert_matches!(interpreter().interpret_event(&event), Interpretation::Malformed(m) if m.contains("removed"));
    }

    #[test]
    fn non_string_state_is_malformed() {
        let event = json!({
            "data": {"entity_id": ENTITY, "new_state": {"state": true}},
        });
        assert_matches!(interpreter().interpret_event(&event), Interpretation::Malformed(_));
    }

    #[test]
    fn states_lookup_finds_entity() {
        let states = json!([
            {"entity_id": "sun.sun", "state": "above_horizon"},
            {"entity_id": ENTITY, "state": "on"},
        ]);
        assert_eq!(
            interpreter().interpret_states(&states).state(),
            Some(ObservedState::Busy)
        );
    }

    #[test]
    fn states_lookup_missing_entity() {
        let states = json!([{"entity_id": "sun.sun", "state": "above_horizon"}]);
        assert_eq!(interpreter().interpret_states(&states), Interpretation::NotFound);
    }

    #[test]
    fn states_lookup_not_array() {
        assert_matches!(
            interpreter().interpret_states(&json!({"entity_id": ENTITY})),
            Interpretation::Malformed(_)
        );
    }
}
