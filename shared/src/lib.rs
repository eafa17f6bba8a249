//! Groundlink Shared Protocol Types
//!
//! This crate provides the wire model and frame codec for communication
//! between the gateway and the ground-control platform.

pub mod codec;
pub mod state;
pub mod transform;

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use state::CommandState;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Protocol parameters shared by the link and the simulated spacecraft
pub mod limits {
    /// Fixed delay between reconnection attempts
    pub const RECONNECT_DELAY_SECS: u64 = 5;

    /// Transport-level connect timeout
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;

    /// Telemetry beacon tick interval
    pub const BEACON_INTERVAL_MS: u64 = 1000;

    /// Battery voltage at or below which the beacon raises a critical alert
    pub const BATTERY_ALERT_VOLTS: f64 = 2.5;

    /// Battery voltage at or above which the beacon reports recovery.
    /// Higher than the alert threshold so the pair cannot flap.
    pub const BATTERY_RECOVER_VOLTS: f64 = 3.2;

    /// Battery voltage forced on entry into ERROR beacon mode
    pub const ERROR_MODE_START_VOLTS: f64 = 2.0;
}

/// A unit of requested work received from ground control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: i64,
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

/// Reference to a command by id, as carried by cancellation requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRef {
    pub id: i64,
}

/// A typed command field value.
///
/// `Number` exists so a float where an integer was declared still parses;
/// schema validation then rejects it with a descriptive error instead of
/// the whole envelope failing to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
}

impl FieldValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Integer(_) => "integer",
            FieldValue::Number(_) => "number",
            FieldValue::String(_) => "string",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Boolean(b) => write!(f, "{b}"),
            FieldValue::Integer(n) => write!(f, "{n}"),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::String(s) => write!(f, "{s}"),
        }
    }
}

/// Messages ground control sends down to the gateway
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Command {
        command: Command,
    },
    Cancel {
        command: CommandRef,
    },
    Error {
        error: Value,
    },
    Hello {
        #[serde(flatten)]
        detail: Map<String, Value>,
    },
    Transit {
        transit: Transit,
    },
    RateLimit {
        rate_limit: Value,
    },
}

/// Pass announcement from a ground station
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Transit {
    pub satellite_name: String,
    pub ground_station_name: String,
}

/// Messages the gateway sends up to ground control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    CommandUpdate {
        command: CommandUpdate,
    },
    Measurements {
        measurements: Vec<Measurement>,
    },
    Events {
        events: Vec<Event>,
    },
    CommandDefinitionsUpdate {
        command_definitions: CommandDefinitions,
    },
    FileList {
        file_list: FileList,
    },
}

impl OutboundMessage {
    pub fn update(update: CommandUpdate) -> Self {
        OutboundMessage::CommandUpdate { command: update }
    }

    /// Terminal success report carrying the command output
    pub fn completed(id: i64, output: impl Into<String>) -> Self {
        let output: String = output.into();
        Self::update(CommandUpdate::new(id, CommandState::Completed).with("output", output))
    }

    /// Terminal failure report carrying every error found
    pub fn failed(id: i64, errors: Vec<String>) -> Self {
        Self::update(CommandUpdate::new(id, CommandState::Failed).with("errors", errors))
    }

    /// Terminal cancellation report
    pub fn cancelled(id: i64) -> Self {
        Self::update(CommandUpdate::new(id, CommandState::Cancelled))
    }
}

/// Progress or terminal report for one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandUpdate {
    pub id: i64,
    pub state: CommandState,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

impl CommandUpdate {
    pub fn new(id: i64, state: CommandState) -> Self {
        Self {
            id,
            state,
            detail: Map::new(),
        }
    }

    /// Attach a free-form key/value pair to the update
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }
}

/// One telemetry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub system: String,
    pub subsystem: String,
    pub metric: String,
    pub value: f64,
    pub timestamp: u64,
}

impl Measurement {
    /// The timestamp defaults to the current time; source records carrying
    /// their own can overwrite it.
    pub fn new(
        system: impl Into<String>,
        subsystem: impl Into<String>,
        metric: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            system: system.into(),
            subsystem: subsystem.into(),
            metric: metric.into(),
            value,
            timestamp: now_ms(),
        }
    }
}

/// Severity of an operator-visible event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Nominal,
    Warning,
    Error,
    Critical,
}

/// An operator-visible event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub system: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub command_id: Option<i64>,
    pub debug: Option<Value>,
    pub level: EventLevel,
    pub message: String,
    pub timestamp: u64,
}

impl Event {
    /// A nominal gateway event; severity and typing can be layered on
    pub fn new(system: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            event_type: "Gateway Event".into(),
            command_id: None,
            debug: None,
            level: EventLevel::Nominal,
            message: message.into(),
            timestamp: now_ms(),
        }
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    pub fn command_id(mut self, id: i64) -> Self {
        self.command_id = Some(id);
        self
    }

    pub fn debug(mut self, debug: Value) -> Self {
        self.debug = Some(debug);
        self
    }
}

/// The command menu advertised for one system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDefinitions {
    pub system: String,
    pub definitions: BTreeMap<String, CommandDef>,
}

/// Definition of one command type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDef {
    pub display_name: String,
    pub description: String,
    pub fields: Vec<FieldDef>,
}

/// Declared schema for one command field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Vec<FieldValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldValue>,
}

/// Declared type of a command field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Boolean,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "string"),
            FieldType::Integer => write!(f, "integer"),
            FieldType::Boolean => write!(f, "boolean"),
        }
    }
}

/// A downlinked file index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileList {
    pub system: String,
    pub timestamp: u64,
    pub files: Vec<FileEntry>,
}

/// One entry in a downlinked file index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub timestamp: u64,
    pub metadata: Value,
}

/// First frame on every new connection; stands in for the HTTP-level
/// headers of the hosted deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_envelope_parses() {
        let raw = r#"{"type":"command","command":{"id":42,"type":"telemetry","fields":{"mode":"ERROR","duration":5}}}"#;
        let message: InboundMessage = serde_json::from_str(raw).unwrap();
        match message {
            InboundMessage::Command { command } => {
                assert_eq!(command.id, 42);
                assert_eq!(command.command_type, "telemetry");
                assert_eq!(
                    command.fields.get("mode"),
                    Some(&FieldValue::String("ERROR".into()))
                );
                assert_eq!(command.fields.get("duration"), Some(&FieldValue::Integer(5)));
            }
            other => panic!("parsed as {other:?}"),
        }
    }

    #[test]
    fn cancel_envelope_parses() {
        let raw = r#"{"type":"cancel","command":{"id":17}}"#;
        let message: InboundMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(
            message,
            InboundMessage::Cancel {
                command: CommandRef { id: 17 }
            }
        );
    }

    #[test]
    fn field_values_keep_their_types() {
        let fields: BTreeMap<String, FieldValue> =
            serde_json::from_value(json!({"a": true, "b": 7, "c": 7.5, "d": "x"})).unwrap();
        assert_eq!(fields["a"], FieldValue::Boolean(true));
        assert_eq!(fields["b"], FieldValue::Integer(7));
        assert_eq!(fields["c"], FieldValue::Number(7.5));
        assert_eq!(fields["d"], FieldValue::String("x".into()));
    }

    #[test]
    fn command_update_merges_extra_detail() {
        let message = OutboundMessage::completed(9, "pong");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "command_update");
        assert_eq!(value["command"]["id"], 9);
        assert_eq!(value["command"]["state"], "completed");
        assert_eq!(value["command"]["output"], "pong");
    }

    #[test]
    fn failed_update_carries_errors() {
        let message = OutboundMessage::failed(3, vec!["bad field".into()]);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["command"]["state"], "failed");
        assert_eq!(value["command"]["errors"], json!(["bad field"]));
    }

    #[test]
    fn measurement_defaults_timestamp() {
        let metric = Measurement::new("Space Oddity", "battery", "voltage", 3.9);
        assert!(metric.timestamp > 0);
        let value = serde_json::to_value(&metric).unwrap();
        assert_eq!(value["subsystem"], "battery");
    }

    #[test]
    fn event_serializes_null_optionals() {
        let event = Event::new("Space Oddity", "hello");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["level"], "nominal");
        assert_eq!(value["type"], "Gateway Event");
        assert!(value["command_id"].is_null());
        assert!(value["debug"].is_null());
    }

    #[test]
    fn field_def_omits_absent_range_and_default() {
        let def = FieldDef {
            name: "mode".into(),
            field_type: FieldType::String,
            range: None,
            default: None,
        };
        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value, json!({"name": "mode", "type": "string"}));
    }

    #[test]
    fn handshake_omits_absent_authorization() {
        let handshake = Handshake {
            token: "tok".into(),
            authorization: None,
        };
        let value = serde_json::to_value(&handshake).unwrap();
        assert_eq!(value, json!({"token": "tok"}));
    }
}
