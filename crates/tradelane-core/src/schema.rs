//! Closed-world schema checks for JSON payloads.
//!
//! Every object shape enumerates its allowed keys and their primitive kind.
//! Unknown keys, missing keys and wrong kinds are all rejected.

use serde_json::Value;

use crate::event::EVENT_SCHEMA_VERSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    String,
    Array,
    Object,
    Bool,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::String => value.is_string(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::Bool => value.is_boolean(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::String => "string",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Bool => "bool",
        }
    }
}

/// A closed object shape.
#[derive(Debug, Clone, Copy)]
pub struct Shape {
    pub name: &'static str,
    pub fields: &'static [(&'static str, FieldKind)],
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("{path}: expected object")]
    NotAnObject { path: String },
    #[error("{path}: unknown key '{key}'")]
    UnknownKey { path: String, key: String },
    #[error("{path}: missing key '{key}'")]
    MissingKey { path: String, key: String },
    #[error("{path}: key '{key}' must be {expected}")]
    WrongKind {
        path: String,
        key: String,
        expected: &'static str,
    },
    #[error("{path}: unsupported Version {found} (expected {expected})", expected = EVENT_SCHEMA_VERSION)]
    UnsupportedVersion { path: String, found: i64 },
}

use FieldKind::{Array, Integer, String as Str};

pub const EVENT_PAYLOAD: Shape = Shape {
    name: "EventPayload",
    fields: &[("Version", Integer), ("Tick", Integer), ("Events", Array)],
};

pub const LOGISTICS_EVENT: Shape = Shape {
    name: "LogisticsEvent",
    fields: &[
        ("Version", Integer),
        ("Seq", Integer),
        ("Tick", Integer),
        ("Type", Integer),
        ("FleetId", Str),
        ("GoodId", Str),
        ("Amount", Integer),
        ("SourceNodeId", Str),
        ("TargetNodeId", Str),
        ("SourceMarketId", Str),
        ("TargetMarketId", Str),
        ("Note", Str),
    ],
};

pub const SECURITY_EVENT: Shape = Shape {
    name: "SecurityEvent",
    fields: &[
        ("Version", Integer),
        ("Seq", Integer),
        ("Tick", Integer),
        ("Type", Integer),
        ("EdgeId", Str),
        ("FromNodeId", Str),
        ("ToNodeId", Str),
        ("RiskBand", Str),
        ("DelayTicks", Integer),
        ("LossUnits", Integer),
        ("InspectionTicks", Integer),
        ("CauseChain", Str),
        ("Note", Str),
    ],
};

pub const FLEET_EVENT: Shape = Shape {
    name: "FleetEvent",
    fields: &[
        ("Version", Integer),
        ("Seq", Integer),
        ("Tick", Integer),
        ("Type", Integer),
        ("FleetId", Str),
        ("EdgeId", Str),
        ("NodeId", Str),
        ("ChosenRouteId", Str),
        ("CandidateCount", Integer),
        ("TieBreakReason", Str),
        ("RiskScore", Integer),
        ("DiscoveryId", Str),
        ("ReasonCode", Integer),
        ("PhaseAfter", Integer),
        ("Note", Str),
    ],
};

/// Check one object against a closed shape.
pub fn validate_object(value: &Value, shape: &Shape, path: &str) -> Result<(), SchemaError> {
    let Some(obj) = value.as_object() else {
        return Err(SchemaError::NotAnObject {
            path: path.to_string(),
        });
    };

    // serde_json maps iterate in sorted key order, so the first unknown
    // key reported is stable.
    for key in obj.keys() {
        if !shape.fields.iter().any(|(name, _)| name == key) {
            return Err(SchemaError::UnknownKey {
                path: path.to_string(),
                key: key.clone(),
            });
        }
    }
    for (name, kind) in shape.fields {
        match obj.get(*name) {
            None => {
                return Err(SchemaError::MissingKey {
                    path: path.to_string(),
                    key: (*name).to_string(),
                });
            }
            Some(v) if !kind.matches(v) => {
                return Err(SchemaError::WrongKind {
                    path: path.to_string(),
                    key: (*name).to_string(),
                    expected: kind.as_str(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn check_version(value: &Value, path: &str) -> Result<(), SchemaError> {
    let found = value.get("Version").and_then(Value::as_i64).unwrap_or(-1);
    if found != EVENT_SCHEMA_VERSION {
        return Err(SchemaError::UnsupportedVersion {
            path: path.to_string(),
            found,
        });
    }
    Ok(())
}

fn validate_payload(value: &Value, event_shape: &Shape) -> Result<(), SchemaError> {
    let root = event_shape.name;
    validate_object(value, &EVENT_PAYLOAD, root)?;
    check_version(value, root)?;
    if let Some(events) = value.get("Events").and_then(Value::as_array) {
        for (i, event) in events.iter().enumerate() {
            let path = format!("{root}.Events[{i}]");
            validate_object(event, event_shape, &path)?;
            check_version(event, &path)?;
        }
    }
    Ok(())
}

pub fn validate_logistics_payload(value: &Value) -> Result<(), SchemaError> {
    validate_payload(value, &LOGISTICS_EVENT)
}

pub fn validate_security_payload(value: &Value) -> Result<(), SchemaError> {
    validate_payload(value, &SECURITY_EVENT)
}

pub fn validate_fleet_payload(value: &Value) -> Result<(), SchemaError> {
    validate_payload(value, &FLEET_EVENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::*;

    fn logistics_payload() -> Value {
        let mut log = EventLog::new();
        let mut e = LogisticsEvent::new(4, LogisticsEventType::PickupIssued, "f1");
        e.good_id = "ore".into();
        e.amount = 5;
        log.emit(e);
        log.finalize();
        log.to_payload(5)
    }

    #[test]
    fn emitted_payloads_validate() {
        assert_eq!(validate_logistics_payload(&logistics_payload()), Ok(()));

        let mut sec = EventLog::new();
        sec.emit(SecurityEvent {
            edge_id: "lane_1".into(),
            ..SecurityEvent::default()
        });
        sec.finalize();
        assert_eq!(validate_security_payload(&sec.to_payload(0)), Ok(()));

        let mut fleet = EventLog::new();
        fleet.emit(FleetEvent::new(0, FleetEventType::RouteChosen, "f1"));
        fleet.finalize();
        assert_eq!(validate_fleet_payload(&fleet.to_payload(0)), Ok(()));
    }

    #[test]
    fn unknown_key_rejected() {
        let mut payload = logistics_payload();
        payload["Events"][0]["Extra"] = Value::from(1);
        let err = validate_logistics_payload(&payload).unwrap_err();
        assert_eq!(
            err.to_string(),
            "LogisticsEvent.Events[0]: unknown key 'Extra'"
        );
    }

    #[test]
    fn wrong_kind_rejected() {
        let mut payload = logistics_payload();
        payload["Events"][0]["Amount"] = Value::from("five");
        assert!(matches!(
            validate_logistics_payload(&payload),
            Err(SchemaError::WrongKind { expected: "integer", .. })
        ));
    }

    #[test]
    fn missing_key_and_version_rejected() {
        let mut payload = logistics_payload();
        if let Some(obj) = payload["Events"][0].as_object_mut() {
            obj.remove("Note");
        }
        assert!(matches!(
            validate_logistics_payload(&payload),
            Err(SchemaError::MissingKey { .. })
        ));

        let mut payload = logistics_payload();
        payload["Version"] = Value::from(2);
        assert!(matches!(
            validate_logistics_payload(&payload),
            Err(SchemaError::UnsupportedVersion { found: 2, .. })
        ));
    }

    #[test]
    fn cross_log_payload_rejected() {
        let payload = logistics_payload();
        assert!(validate_fleet_payload(&payload).is_err());
    }
}
