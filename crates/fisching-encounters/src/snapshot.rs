//! Persisted scheduler snapshots.
//!
//! Snapshots hold only remaining durations, never absolute timestamps.
//! Decoding from a raw [`serde_json::Value`] never fails: every field that is
//! missing or has the wrong type falls back to its zeroed default and the
//! rest of the snapshot is still read.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use fisching_common::{EncounterError, EncounterResult};

/// Coerces a loosely typed value into a finite float.
///
/// Numbers, numeric strings and booleans are accepted; anything else
/// (including NaN and infinities) becomes `0.0`.
#[must_use]
pub fn lenient_f64(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.map_or(0.0, finite_or_zero)
}

/// Replaces NaN and infinities with `0.0`.
#[must_use]
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// `max(0, value)`, with non-finite values treated as zero.
#[must_use]
pub fn remaining(value: f64) -> f64 {
    finite_or_zero(value).max(0.0)
}

fn object_entries<'a>(
    value: Option<&'a Value>,
) -> impl Iterator<Item = (&'a String, &'a Map<String, Value>)> {
    value
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|map| map.iter())
        .filter_map(|(key, entry)| entry.as_object().map(|entry| (key, entry)))
}

fn encode<T: Serialize>(snapshot: &T) -> Value {
    serde_json::to_value(snapshot).unwrap_or_default()
}

fn encode_string<T: Serialize>(snapshot: &T) -> EncounterResult<String> {
    serde_json::to_string(snapshot).map_err(|e| EncounterError::Snapshot(e.to_string()))
}

fn decode_str(text: &str) -> EncounterResult<Value> {
    serde_json::from_str(text).map_err(|e| EncounterError::Snapshot(e.to_string()))
}

/// Persisted progress of one hunt definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HuntProgressSnapshot {
    /// Clamped disturbance.
    pub disturbance: f64,
    /// Seconds of cooldown left.
    pub cooldown_remaining_s: f64,
    /// Seconds until the next eligibility check.
    pub next_check_in_s: f64,
}

/// Persisted active hunt of one pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveHuntSnapshot {
    /// Hunt id.
    pub hunt_id: String,
    /// Seconds left.
    pub remaining_s: f64,
}

/// Hunt scheduler snapshot.
///
/// JSON shape: `{"hunts": {id: {...}}, "active_by_pool": {pool: {...}}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuntSnapshot {
    /// Progress keyed by hunt id.
    pub hunts: BTreeMap<String, HuntProgressSnapshot>,
    /// Unexpired active hunts keyed by pool name.
    pub active_by_pool: BTreeMap<String, ActiveHuntSnapshot>,
}

impl HuntSnapshot {
    /// Decodes a raw value, defaulting every malformed part.
    #[must_use]
    pub fn from_value(raw: &Value) -> Self {
        let hunts = object_entries(raw.get("hunts"))
            .map(|(hunt_id, entry)| {
                let progress = HuntProgressSnapshot {
                    disturbance: lenient_f64(entry.get("disturbance")),
                    cooldown_remaining_s: lenient_f64(entry.get("cooldown_remaining_s")),
                    next_check_in_s: lenient_f64(entry.get("next_check_in_s")),
                };
                (hunt_id.clone(), progress)
            })
            .collect();

        let active_by_pool = object_entries(raw.get("active_by_pool"))
            .filter_map(|(pool, entry)| {
                let hunt_id = entry.get("hunt_id")?.as_str()?.to_string();
                let remaining_s = lenient_f64(entry.get("remaining_s"));
                Some((pool.clone(), ActiveHuntSnapshot { hunt_id, remaining_s }))
            })
            .collect();

        Self {
            hunts,
            active_by_pool,
        }
    }

    /// Encodes into a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        encode(self)
    }

    /// Encodes into a JSON string.
    pub fn to_json(&self) -> EncounterResult<String> {
        encode_string(self)
    }

    /// Decodes from JSON text. Only invalid JSON is an error.
    pub fn from_json(text: &str) -> EncounterResult<Self> {
        decode_str(text).map(|raw| Self::from_value(&raw))
    }
}

/// Persisted schedule of one event definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EventProgressSnapshot {
    /// Seconds until the next eligibility check.
    pub next_check_in_s: f64,
}

/// Persisted active world event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveEventSnapshot {
    /// Event name.
    pub name: String,
    /// Seconds left.
    pub remaining_s: f64,
}

/// Event scheduler snapshot.
///
/// JSON shape: `{"active": {"name", "remaining_s"} | null, "events": {name: {...}}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSnapshot {
    /// Active event, if still running.
    pub active: Option<ActiveEventSnapshot>,
    /// Check schedule keyed by event name.
    pub events: BTreeMap<String, EventProgressSnapshot>,
}

impl EventSnapshot {
    /// Decodes a raw value, defaulting every malformed part.
    #[must_use]
    pub fn from_value(raw: &Value) -> Self {
        let events = object_entries(raw.get("events"))
            .map(|(name, entry)| {
                let progress = EventProgressSnapshot {
                    next_check_in_s: lenient_f64(entry.get("next_check_in_s")),
                };
                (name.clone(), progress)
            })
            .collect();

        let active = raw
            .get("active")
            .and_then(Value::as_object)
            .and_then(|entry| {
                let name = entry.get("name")?.as_str()?.to_string();
                let remaining_s = lenient_f64(entry.get("remaining_s"));
                Some(ActiveEventSnapshot { name, remaining_s })
            });

        Self { active, events }
    }

    /// Encodes into a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        encode(self)
    }

    /// Encodes into a JSON string.
    pub fn to_json(&self) -> EncounterResult<String> {
        encode_string(self)
    }

    /// Decodes from JSON text. Only invalid JSON is an error.
    pub fn from_json(text: &str) -> EncounterResult<Self> {
        decode_str(text).map(|raw| Self::from_value(&raw))
    }
}

/// Combined snapshot of both schedulers of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncounterSnapshot {
    /// Event scheduler part.
    pub events: EventSnapshot,
    /// Hunt scheduler part.
    pub hunts: HuntSnapshot,
}

impl EncounterSnapshot {
    /// Decodes a raw value, defaulting every malformed part.
    #[must_use]
    pub fn from_value(raw: &Value) -> Self {
        Self {
            events: raw.get("events").map(EventSnapshot::from_value).unwrap_or_default(),
            hunts: raw.get("hunts").map(HuntSnapshot::from_value).unwrap_or_default(),
        }
    }

    /// Encodes into a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        encode(self)
    }

    /// Encodes into a JSON string.
    pub fn to_json(&self) -> EncounterResult<String> {
        encode_string(self)
    }

    /// Decodes from JSON text. Only invalid JSON is an error.
    pub fn from_json(text: &str) -> EncounterResult<Self> {
        decode_str(text).map(|raw| Self::from_value(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_f64() {
        assert_eq!(lenient_f64(Some(&json!(2.5))), 2.5);
        assert_eq!(lenient_f64(Some(&json!(3))), 3.0);
        assert_eq!(lenient_f64(Some(&json!(" 4.5 "))), 4.5);
        assert_eq!(lenient_f64(Some(&json!(true))), 1.0);
        assert_eq!(lenient_f64(Some(&json!("abc"))), 0.0);
        assert_eq!(lenient_f64(Some(&json!("inf"))), 0.0);
        assert_eq!(lenient_f64(Some(&json!(null))), 0.0);
        assert_eq!(lenient_f64(Some(&json!([1.0]))), 0.0);
        assert_eq!(lenient_f64(None), 0.0);
    }

    #[test]
    fn test_remaining() {
        assert_eq!(remaining(-3.0), 0.0);
        assert_eq!(remaining(f64::NAN), 0.0);
        assert_eq!(remaining(7.0), 7.0);
    }

    #[test]
    fn test_hunt_snapshot_shape() {
        let mut snapshot = HuntSnapshot::default();
        snapshot.hunts.insert(
            "h1".to_string(),
            HuntProgressSnapshot {
                disturbance: 4.0,
                cooldown_remaining_s: 0.0,
                next_check_in_s: 12.0,
            },
        );
        snapshot.active_by_pool.insert(
            "Rio".to_string(),
            ActiveHuntSnapshot {
                hunt_id: "h1".to_string(),
                remaining_s: 30.0,
            },
        );

        assert_eq!(
            snapshot.to_value(),
            json!({
                "hunts": {"h1": {"disturbance": 4.0, "cooldown_remaining_s": 0.0, "next_check_in_s": 12.0}},
                "active_by_pool": {"Rio": {"hunt_id": "h1", "remaining_s": 30.0}}
            })
        );
    }

    #[test]
    fn test_hunt_snapshot_from_malformed_value() {
        let raw = json!({
            "hunts": {
                "h1": {"disturbance": "3", "cooldown_remaining_s": [], "next_check_in_s": 5},
                "h2": "not an object"
            },
            "active_by_pool": {
                "Rio": {"hunt_id": 7, "remaining_s": 10},
                "Lagoa": {"hunt_id": "h3"},
                "Mar": []
            }
        });

        let snapshot = HuntSnapshot::from_value(&raw);
        assert_eq!(snapshot.hunts.len(), 1);
        assert_eq!(snapshot.hunts["h1"].disturbance, 3.0);
        assert_eq!(snapshot.hunts["h1"].cooldown_remaining_s, 0.0);
        assert_eq!(snapshot.hunts["h1"].next_check_in_s, 5.0);
        assert_eq!(snapshot.active_by_pool.len(), 1);
        assert_eq!(snapshot.active_by_pool["Lagoa"].remaining_s, 0.0);
    }

    #[test]
    fn test_wrong_top_level_shapes_default() {
        assert_eq!(HuntSnapshot::from_value(&json!([1, 2])), HuntSnapshot::default());
        assert_eq!(HuntSnapshot::from_value(&json!({"hunts": 3})), HuntSnapshot::default());
        assert_eq!(EventSnapshot::from_value(&json!(null)), EventSnapshot::default());
        assert_eq!(EncounterSnapshot::from_value(&json!("x")), EncounterSnapshot::default());
    }

    #[test]
    fn test_event_snapshot_null_active() {
        let snapshot = EventSnapshot::default();
        assert_eq!(snapshot.to_value(), json!({"active": null, "events": {}}));
        assert_eq!(EventSnapshot::from_value(&snapshot.to_value()), snapshot);
    }

    #[test]
    fn test_json_text_errors_only_on_invalid_json() {
        assert!(HuntSnapshot::from_json("{not json").is_err());
        let snapshot = HuntSnapshot::from_json("{\"hunts\": []}").expect("valid json");
        assert!(snapshot.hunts.is_empty());
    }

    #[test]
    fn test_encounter_snapshot_text_roundtrip() {
        let mut snapshot = EncounterSnapshot::default();
        snapshot.events.active = Some(ActiveEventSnapshot {
            name: "Tempestade".to_string(),
            remaining_s: 12.5,
        });
        let text = snapshot.to_json().expect("encodes");
        assert_eq!(EncounterSnapshot::from_json(&text).expect("decodes"), snapshot);
    }
}
