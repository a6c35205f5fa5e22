//! DAP message envelopes.
//!
//! Requests arrive as generic JSON objects and are lifted into a
//! [`DecodedRequest`]; everything the adapter sends back is a [`Response`] or an
//! [`Event`], both stamped with a server-issued `seq`.

use crate::error::{DapError, DapResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Adapter identifier a client must announce in `initialize`.
pub const ADAPTER_ID: &str = "mqtqasm";

/// The `type` discriminator of every DAP protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Event,
}

/// A request as delivered by the transport, before any command-specific parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRequest {
    /// Client-issued sequence number.
    pub seq: i64,
    /// Command name, e.g. `initialize`.
    pub command: String,
    /// Command arguments; `None` when the client omitted them.
    pub arguments: Option<Map<String, Value>>,
}

impl DecodedRequest {
    /// Lift a decoded JSON value into a request envelope.
    ///
    /// Fails with [`DapError::MalformedRequest`] when a structural field is
    /// missing or has the wrong type.
    pub fn from_value(value: &Value) -> DapResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| DapError::MalformedRequest("request must be a JSON object".into()))?;

        match obj.get("type").and_then(Value::as_str) {
            Some("request") => {}
            Some(other) => {
                return Err(DapError::MalformedRequest(format!(
                    "expected message type `request`, got `{other}`"
                )));
            }
            None => return Err(DapError::MalformedRequest("missing field `type`".into())),
        }

        let seq = obj
            .get("seq")
            .and_then(Value::as_i64)
            .ok_or_else(|| DapError::MalformedRequest("missing integer field `seq`".into()))?;
        let command = obj
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| DapError::MalformedRequest("missing string field `command`".into()))?
            .to_string();

        let arguments = match obj.get("arguments") {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map.clone()),
            Some(_) => {
                return Err(DapError::MalformedRequest(
                    "`arguments` must be an object".into(),
                ));
            }
        };

        Ok(Self {
            seq,
            command,
            arguments,
        })
    }

    /// Deserialize the arguments into `T`, failing if they are absent.
    pub fn require_arguments<T: DeserializeOwned>(&self) -> DapResult<T> {
        let map = self.arguments.as_ref().ok_or_else(|| {
            DapError::MalformedRequest(format!("`{}` requires `arguments`", self.command))
        })?;
        decode_arguments(&self.command, map)
    }

    /// Deserialize the arguments into `T`, using `T::default()` when absent.
    pub fn optional_arguments<T: DeserializeOwned + Default>(&self) -> DapResult<T> {
        match self.arguments.as_ref() {
            Some(map) => decode_arguments(&self.command, map),
            None => Ok(T::default()),
        }
    }
}

fn decode_arguments<T: DeserializeOwned>(command: &str, map: &Map<String, Value>) -> DapResult<T> {
    serde_json::from_value(Value::Object(map.clone()))
        .map_err(|e| DapError::MalformedRequest(format!("invalid `{command}` arguments: {e}")))
}

/// Best-effort `seq`/`command` pair read from a value that may not be a valid
/// request; used to echo something meaningful in failure responses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestHeader {
    pub seq: i64,
    pub command: String,
}

impl RequestHeader {
    pub fn peek(value: &Value) -> Self {
        Self {
            seq: value.get("seq").and_then(Value::as_i64).unwrap_or(0),
            command: value
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// A response to exactly one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub seq: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    /// Build a success envelope. `seq` is left at 0 until the dispatcher stamps it.
    pub fn success(request_seq: i64, command: impl Into<String>, body: Value) -> Self {
        Self {
            seq: 0,
            kind: MessageKind::Response,
            request_seq,
            success: true,
            command: command.into(),
            message: None,
            body: Some(body),
        }
    }

    /// Build a failure envelope carrying a human-readable message.
    pub fn failure(request_seq: i64, command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            seq: 0,
            kind: MessageKind::Response,
            request_seq,
            success: false,
            command: command.into(),
            message: Some(message.into()),
            body: None,
        }
    }

    pub fn with_seq(mut self, seq: i64) -> Self {
        self.seq = seq;
        self
    }
}

/// An adapter-initiated notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    pub fn new(event: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            kind: MessageKind::Event,
            event: event.into(),
            body,
        }
    }

    pub fn with_seq(mut self, seq: i64) -> Self {
        self.seq = seq;
        self
    }
}

/// Anything the adapter writes to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProtocolMessage {
    Response(Response),
    Event(Event),
}

impl ProtocolMessage {
    pub fn seq(&self) -> i64 {
        match self {
            ProtocolMessage::Response(r) => r.seq,
            ProtocolMessage::Event(e) => e.seq,
        }
    }

    /// The response, if this message is one.
    pub fn as_response(&self) -> Option<&Response> {
        match self {
            ProtocolMessage::Response(r) => Some(r),
            ProtocolMessage::Event(_) => None,
        }
    }

    /// The event, if this message is one.
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            ProtocolMessage::Event(e) => Some(e),
            ProtocolMessage::Response(_) => None,
        }
    }
}

impl From<Response> for ProtocolMessage {
    fn from(r: Response) -> Self {
        ProtocolMessage::Response(r)
    }
}

impl From<Event> for ProtocolMessage {
    fn from(e: Event) -> Self {
        ProtocolMessage::Event(e)
    }
}
