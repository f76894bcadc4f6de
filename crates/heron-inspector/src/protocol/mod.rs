//! Message schema spoken by the inspector
//!
//! Requests are `{id, method, params}`; responses echo the id with either a
//! `result` or an `error` object. Names and shapes follow the Chrome DevTools
//! protocol so existing clients can be pointed at the listener.

pub mod debugger;
pub mod runtime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Incoming command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Reply to a [`Request`]; `id` is `null` when the request could not be parsed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: Option<u64>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(ProtocolError),
}

impl Response {
    pub fn result(id: u64, result: Value) -> Self {
        Self {
            id: Some(id),
            outcome: Outcome::Result(result),
        }
    }

    pub fn error(id: Option<u64>, error: ProtocolError) -> Self {
        Self {
            id,
            outcome: Outcome::Error(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }
}

/// Empty parameter object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Empty {}

/// Notification raised by the session and queued until drained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Event {
    #[serde(rename = "Debugger.paused")]
    Paused(debugger::PausedEvent),
    #[serde(rename = "Debugger.resumed")]
    Resumed(Empty),
    #[serde(rename = "Debugger.scriptParsed")]
    ScriptParsed(debugger::ScriptParsedEvent),
    #[serde(rename = "Debugger.breakpointResolved")]
    BreakpointResolved(debugger::BreakpointResolvedEvent),
}

impl Event {
    /// Protocol method name of the event
    pub fn method(&self) -> &'static str {
        match self {
            Self::Paused(_) => "Debugger.paused",
            Self::Resumed(_) => "Debugger.resumed",
            Self::ScriptParsed(_) => "Debugger.scriptParsed",
            Self::BreakpointResolved(_) => "Debugger.breakpointResolved",
        }
    }
}

/// Result of `Inspector.drainEvents`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrainEventsResult {
    pub events: Vec<Event>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_envelope() {
        let ok = Response::result(3, json!({"scriptSource": "1+1"}));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"id": 3, "result": {"scriptSource": "1+1"}})
        );

        let err = Response::error(None, ProtocolError::parse_error("expected value"));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"id": null, "error": {"code": -32700, "message": "expected value"}})
        );
    }

    #[test]
    fn test_request_params_default() {
        let req: Request = serde_json::from_value(json!({"id": 1, "method": "Debugger.resume"}))
            .unwrap();
        assert_eq!(req.params, Value::Null);
    }

    #[test]
    fn test_event_encoding() {
        let event = Event::Resumed(Empty {});
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"method": "Debugger.resumed", "params": {}})
        );
        assert_eq!(event.method(), "Debugger.resumed");
    }
}
