//! Message envelope: outbound request encoding and inbound decoding.
//!
//! Outbound: `{"messageID": "<n>", "command": "<name>", ...fields}`.
//! Inbound: `messageID` and `command` are required; `response` is present
//! (and non-empty) only when the message answers a request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::Error;

/// Command names used on the wire.
pub mod command {
    pub const GET_PARAM_LIST: &str = "GetParamList";
    pub const SEND_PARAM_LIST: &str = "SendParamList";
    pub const REQUEST_PARAM_LIST: &str = "RequestParamList";
    pub const SET_PARAM_LIST: &str = "SetParamList";
    pub const WRITE_PARAM_LIST: &str = "WriteParamList";
    pub const NOTIFY_LIST: &str = "NotifyList";
    pub const GET_QUERY: &str = "GetQuery";
    pub const SEND_QUERY: &str = "SendQuery";
}

/// Response code the controller uses for success.
pub const SUCCESS_RESPONSE: &str = "200";

/// Object name the controller resolves to "the system object" in queries.
pub const SYSTEM_QUERY_OBJNAM: &str = "INCR";

const MESSAGE_ID_FIELD: &str = "messageID";
const COMMAND_FIELD: &str = "command";
const RESPONSE_FIELD: &str = "response";

// ── Outbound ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(rename = "messageID")]
    message_id: &'a str,
    command: &'a str,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

/// Serialize a command into a single wire line (without terminator).
///
/// Reserved envelope keys in `payload` are ignored so the generated
/// message id always wins.
pub fn encode_request(
    message_id: &str,
    command: &str,
    mut payload: Map<String, Value>,
) -> Result<String, Error> {
    if payload.remove(MESSAGE_ID_FIELD).is_some() || payload.remove(COMMAND_FIELD).is_some() {
        tracing::debug!(command, "ignoring reserved envelope keys in payload");
    }
    let envelope = Envelope {
        message_id,
        command,
        payload,
    };
    Ok(serde_json::to_string(&envelope)?)
}

// ── Inbound ──────────────────────────────────────────────────────────

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_id: String,
    pub command: String,
    /// Present only for responses. Its presence drives flow control.
    pub response: Option<String>,
    /// The full JSON object as received.
    pub payload: Value,
}

impl Message {
    /// Decode one framed line.
    ///
    /// Invalid JSON and missing envelope fields are recoverable
    /// ([`Error::is_recoverable_message_error`]); anything else that does
    /// not look like an IntelliCenter message is a protocol violation.
    pub fn parse(line: &str) -> Result<Self, Error> {
        let payload: Value = serde_json::from_str(line).map_err(|e| Error::MalformedJson {
            message: e.to_string(),
            line: line.chars().take(100).collect(),
        })?;

        let obj = payload.as_object().ok_or_else(|| {
            Error::ProtocolViolation(format!("expected a JSON object, got {}", kind(&payload)))
        })?;

        let message_id = match obj.get(MESSAGE_ID_FIELD) {
            None => return Err(Error::MissingField(MESSAGE_ID_FIELD)),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(Error::ProtocolViolation(format!(
                    "messageID must be a string, got {}",
                    kind(other)
                )));
            }
        };

        let command = match obj.get(COMMAND_FIELD) {
            None => return Err(Error::MissingField(COMMAND_FIELD)),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(Error::ProtocolViolation(format!(
                    "command must be a string, got {}",
                    kind(other)
                )));
            }
        };

        let response = obj.get(RESPONSE_FIELD).and_then(truthy);

        Ok(Self {
            message_id,
            command,
            response,
            payload,
        })
    }

    /// `true` when the message answers a request.
    pub fn is_response(&self) -> bool {
        self.response.is_some()
    }

    /// `true` when the message is a response carrying the success code.
    pub fn is_success(&self) -> bool {
        self.response.as_deref() == Some(SUCCESS_RESPONSE)
    }

    /// Look up a top-level field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// Decode the `objectList` field, if present.
    ///
    /// A present but malformed list is a protocol violation.
    pub fn object_list(&self) -> Result<Option<Vec<ObjectEntry>>, Error> {
        match self.payload.get("objectList") {
            None | Some(Value::Null) => Ok(None),
            Some(list) => serde_json::from_value(list.clone())
                .map(Some)
                .map_err(|e| Error::ProtocolViolation(format!("bad objectList: {e}"))),
        }
    }
}

/// Python-style truthiness of the `response` field, normalized to a string.
fn truthy(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".into()),
        Value::Array(a) if !a.is_empty() => Some(value.to_string()),
        Value::Object(o) if !o.is_empty() => Some(value.to_string()),
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One `{objnam, params}` entry from an `objectList`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub objnam: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// One `{objnam, keys}` entry for parameter queries and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamQuery {
    pub objnam: String,
    pub keys: Vec<String>,
}

// ── Payload builders ─────────────────────────────────────────────────

/// `GetParamList` payload: read `keys` of the objects matching `condition`.
pub fn get_param_list(condition: &str, queries: &[ParamQuery]) -> Map<String, Value> {
    to_map(json!({ "condition": condition, "objectList": queries }))
}

/// `RequestParamList` payload: subscribe to changes of the given keys.
pub fn request_param_list(queries: &[ParamQuery]) -> Map<String, Value> {
    to_map(json!({ "objectList": queries }))
}

/// `SetParamList` payload: change attributes of one object.
pub fn set_param_list(objnam: &str, params: Map<String, Value>) -> Map<String, Value> {
    to_map(json!({ "objectList": [{ "objnam": objnam, "params": params }] }))
}

/// `GetQuery` payload for a named query.
pub fn get_query(query_name: &str, arguments: &str) -> Map<String, Value> {
    to_map(json!({ "queryName": query_name, "arguments": arguments }))
}

fn to_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encode_puts_envelope_first() {
        let line = encode_request("7", command::GET_QUERY, get_query("GetHardwareDefinition", ""))
            .unwrap();
        insta::assert_snapshot!(
            line,
            @r#"{"messageID":"7","command":"GetQuery","arguments":"","queryName":"GetHardwareDefinition"}"#
        );
    }

    #[test]
    fn encode_ignores_reserved_keys() {
        let mut payload = Map::new();
        payload.insert("messageID".into(), json!("999"));
        payload.insert("command".into(), json!("Bogus"));
        payload.insert("condition".into(), json!(""));
        let line = encode_request("3", command::GET_PARAM_LIST, payload).unwrap();
        let back = Message::parse(&line).unwrap();
        assert_eq!(back.message_id, "3");
        assert_eq!(back.command, "GetParamList");
    }

    #[test]
    fn round_trip_preserves_command_and_fields() {
        let queries = [ParamQuery {
            objnam: "INCR".into(),
            keys: vec!["PROPNAME".into(), "VER".into()],
        }];
        let line = encode_request(
            "1",
            command::GET_PARAM_LIST,
            get_param_list("OBJTYP=SYSTEM", &queries),
        )
        .unwrap();

        let msg = Message::parse(&line).unwrap();
        assert_eq!(msg.command, "GetParamList");
        assert_eq!(msg.message_id, "1");
        assert!(!msg.is_response());
        assert_eq!(msg.field("condition"), Some(&json!("OBJTYP=SYSTEM")));
        assert_eq!(
            msg.field("objectList"),
            Some(&json!([{ "objnam": "INCR", "keys": ["PROPNAME", "VER"] }]))
        );
    }

    #[test]
    fn parse_response_marker() {
        let msg = Message::parse(
            r#"{"command":"SendParamList","messageID":"4","response":"200","objectList":[]}"#,
        )
        .unwrap();
        assert!(msg.is_response());
        assert!(msg.is_success());
        assert_eq!(msg.object_list().unwrap(), Some(Vec::new()));
    }

    #[test]
    fn empty_response_is_not_a_response() {
        let msg = Message::parse(r#"{"command":"NotifyList","messageID":"4","response":""}"#)
            .unwrap();
        assert!(!msg.is_response());
    }

    #[test]
    fn error_response_is_a_response_but_not_success() {
        let msg = Message::parse(r#"{"command":"SetParamList","messageID":"9","response":"400"}"#)
            .unwrap();
        assert!(msg.is_response());
        assert!(!msg.is_success());
    }

    #[test]
    fn parse_errors_are_classified() {
        assert!(matches!(
            Message::parse("{not json"),
            Err(Error::MalformedJson { .. })
        ));
        assert!(matches!(
            Message::parse(r#"{"command":"NotifyList"}"#),
            Err(Error::MissingField("messageID"))
        ));
        assert!(matches!(
            Message::parse(r#"{"messageID":"1"}"#),
            Err(Error::MissingField("command"))
        ));
        assert!(matches!(
            Message::parse("[1,2,3]"),
            Err(Error::ProtocolViolation(_))
        ));
        assert!(matches!(
            Message::parse(r#"{"messageID":"1","command":42}"#),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn numeric_message_id_is_accepted() {
        let msg = Message::parse(r#"{"messageID":12,"command":"NotifyList"}"#).unwrap();
        assert_eq!(msg.message_id, "12");
    }

    #[test]
    fn malformed_object_list_is_a_violation() {
        let msg = Message::parse(r#"{"messageID":"1","command":"NotifyList","objectList":7}"#)
            .unwrap();
        assert!(matches!(msg.object_list(), Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn object_entries_decode() {
        let msg = Message::parse(
            r#"{"messageID":"1","command":"NotifyList","objectList":[{"objnam":"PUMP1","params":{"STATUS":"4"}}]}"#,
        )
        .unwrap();
        let entries = msg.object_list().unwrap().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].objnam, "PUMP1");
        assert_eq!(entries[0].params.get("STATUS"), Some(&json!("4")));
    }

    #[test]
    fn set_param_list_payload_shape() {
        let mut params = Map::new();
        params.insert("LOTMP".into(), json!("84"));
        let payload = set_param_list("POOL1", params);
        assert_eq!(
            Value::Object(payload),
            json!({ "objectList": [{ "objnam": "POOL1", "params": { "LOTMP": "84" } }] })
        );
    }
}
