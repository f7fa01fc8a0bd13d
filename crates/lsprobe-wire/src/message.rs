//! JSON-RPC message model.
//!
//! Payloads are kept as opaque `serde_json::Value`s; this crate only cares
//! about the envelope (id, method, result/error) needed for correlation.
use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// A correlation identifier linking a request to its response.
///
/// JSON-RPC allows both integer and string ids; callers choose, and the
/// harness must round-trip whichever form the peer uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id.
    Number(i64),
    /// String id.
    Text(String),
}

impl RequestId {
    /// Build an id from a raw JSON value, if it has a valid shape.
    pub fn from_value(value: &serde_json::Value) -> Option<RequestId> {
        if let Some(n) = value.as_i64() {
            Some(RequestId::Number(n))
        } else {
            value.as_str().map(|s| RequestId::Text(s.to_string()))
        }
    }

    /// The id as a raw JSON value.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            RequestId::Number(n) => serde_json::json!(n),
            RequestId::Text(s) => serde_json::json!(s),
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::Text(s.to_string())
    }
}

/// Which way a message travelled relative to the test client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Written by the client to the server.
    Sent,
    /// Read from the server.
    Received,
}

impl Direction {
    /// Stable string form used in the recorded-event store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
        }
    }

    /// Parse the stable string form.
    pub fn parse(s: &str) -> Option<Direction> {
        match s {
            "sent" => Some(Direction::Sent),
            "received" => Some(Direction::Received),
            _ => None,
        }
    }
}

/// An error object in a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    /// The error code.
    pub code: i64,
    /// The error message.
    pub message: String,
    /// Optional structured error data.
    pub data: Option<serde_json::Value>,
}

/// A JSON-RPC message (request, response, or notification).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A request (has id and method; a response is expected).
    Request {
        /// The correlation id.
        id: RequestId,
        /// The method name.
        method: String,
        /// The params (opaque JSON value).
        params: serde_json::Value,
    },
    /// A response (has id, carries result or error, never both).
    Response {
        /// The id of the request this responds to.
        id: RequestId,
        /// The result (if successful).
        result: Option<serde_json::Value>,
        /// The error (if failed).
        error: Option<RpcError>,
    },
    /// A notification (has method, no id, no reply expected).
    Notification {
        /// The method name.
        method: String,
        /// The params.
        params: serde_json::Value,
    },
}

impl Message {
    /// Build a request message.
    pub fn request(
        id: impl Into<RequestId>,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Message::Request {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Build a notification message.
    pub fn notification(method: impl Into<String>, params: serde_json::Value) -> Self {
        Message::Notification {
            method: method.into(),
            params,
        }
    }

    /// Build a successful response.
    pub fn response(id: impl Into<RequestId>, result: serde_json::Value) -> Self {
        Message::Response {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error_response(id: impl Into<RequestId>, code: i64, message: impl Into<String>) -> Self {
        Message::Response {
            id: id.into(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// The method name, if this message carries one.
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request { method, .. } | Message::Notification { method, .. } => Some(method),
            Message::Response { .. } => None,
        }
    }

    /// Serialize to the JSON-RPC envelope.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Message::Request { id, method, params } => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id.to_value(),
                "method": method,
                "params": params,
            }),
            Message::Response { id, result, error } => {
                if let Some(err) = error {
                    let mut body = serde_json::json!({
                        "code": err.code,
                        "message": err.message,
                    });
                    if let Some(data) = &err.data {
                        body["data"] = data.clone();
                    }
                    serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": id.to_value(),
                        "error": body,
                    })
                } else {
                    serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": id.to_value(),
                        "result": result.clone().unwrap_or(serde_json::Value::Null),
                    })
                }
            }
            Message::Notification { method, params } => serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
            }),
        }
    }

    /// Parse a JSON-RPC message from a JSON string.
    pub fn parse(json_str: &str) -> Result<Message, WireError> {
        let value: serde_json::Value = serde_json::from_str(json_str)
            .map_err(|e| WireError::InvalidPayload(format!("invalid JSON: {}", e)))?;
        Message::from_json(&value)
    }

    /// Classify and extract a message from a parsed JSON value.
    pub fn from_json(value: &serde_json::Value) -> Result<Message, WireError> {
        let id = value.get("id");
        let has_method = value.get("method").is_some();

        match (id, has_method) {
            // Request: has both id and method
            (Some(id), true) => {
                let id = RequestId::from_value(id).ok_or_else(|| {
                    WireError::InvalidPayload("id must be integer or string".into())
                })?;
                let method = value["method"]
                    .as_str()
                    .ok_or_else(|| WireError::InvalidPayload("method must be string".into()))?
                    .to_string();
                let params = value
                    .get("params")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                Ok(Message::Request { id, method, params })
            }
            // Response: has id but no method
            (Some(id), false) => {
                let id = RequestId::from_value(id).ok_or_else(|| {
                    WireError::InvalidPayload("id must be integer or string".into())
                })?;
                let result = value.get("result").cloned();
                let error = value.get("error").and_then(|e| {
                    Some(RpcError {
                        code: e.get("code")?.as_i64()?,
                        message: e.get("message")?.as_str()?.to_string(),
                        data: e.get("data").cloned(),
                    })
                });
                if result.is_none() && error.is_none() {
                    return Err(WireError::InvalidPayload(
                        "response carries neither result nor error".into(),
                    ));
                }
                Ok(Message::Response { id, result, error })
            }
            // Notification: has method but no id
            (None, true) => {
                let method = value["method"]
                    .as_str()
                    .ok_or_else(|| WireError::InvalidPayload("method must be string".into()))?
                    .to_string();
                let params = value
                    .get("params")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                Ok(Message::Notification { method, params })
            }
            // Invalid
            (None, false) => Err(WireError::InvalidPayload(
                "message has neither id nor method".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_from_number() {
        let id = RequestId::from_value(&serde_json::json!(7)).unwrap();
        assert_eq!(id, RequestId::Number(7));
        assert_eq!(id.to_string(), "7");
    }

    #[test]
    fn request_id_from_string() {
        let id = RequestId::from_value(&serde_json::json!("req-1")).unwrap();
        assert_eq!(id, RequestId::Text("req-1".into()));
        assert_eq!(id.to_string(), "req-1");
    }

    #[test]
    fn request_id_rejects_other_shapes() {
        assert!(RequestId::from_value(&serde_json::json!(null)).is_none());
        assert!(RequestId::from_value(&serde_json::json!([1])).is_none());
    }

    #[test]
    fn direction_round_trips() {
        assert_eq!(Direction::parse(Direction::Sent.as_str()), Some(Direction::Sent));
        assert_eq!(
            Direction::parse(Direction::Received.as_str()),
            Some(Direction::Received)
        );
        assert_eq!(Direction::parse("upward"), None);
    }

    #[test]
    fn parse_request() {
        let json = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
        let msg = Message::parse(json).unwrap();
        match msg {
            Message::Request { id, method, .. } => {
                assert_eq!(id, RequestId::Number(1));
                assert_eq!(method, "initialize");
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn parse_request_string_id() {
        let json = r#"{"jsonrpc":"2.0","id":"abc","method":"shutdown"}"#;
        let msg = Message::parse(json).unwrap();
        match msg {
            Message::Request { id, params, .. } => {
                assert_eq!(id, RequestId::Text("abc".into()));
                assert!(params.is_null());
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn parse_response_success() {
        let json = r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}"#;
        let msg = Message::parse(json).unwrap();
        match msg {
            Message::Response { id, result, error } => {
                assert_eq!(id, RequestId::Number(1));
                assert!(result.is_some());
                assert!(error.is_none());
            }
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn parse_response_error() {
        let json = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"invalid request"}}"#;
        let msg = Message::parse(json).unwrap();
        match msg {
            Message::Response { error, .. } => {
                let err = error.unwrap();
                assert_eq!(err.code, -32600);
                assert_eq!(err.message, "invalid request");
                assert!(err.data.is_none());
            }
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn parse_response_without_result_or_error() {
        let json = r#"{"jsonrpc":"2.0","id":1}"#;
        assert!(Message::parse(json).is_err());
    }

    #[test]
    fn parse_notification() {
        let json = r#"{"jsonrpc":"2.0","method":"textDocument/publishDiagnostics","params":{"uri":"file:///t.rs","diagnostics":[]}}"#;
        let msg = Message::parse(json).unwrap();
        match msg {
            Message::Notification { method, params } => {
                assert_eq!(method, "textDocument/publishDiagnostics");
                assert!(params["uri"].as_str().is_some());
            }
            _ => panic!("expected notification"),
        }
    }

    #[test]
    fn parse_invalid_json() {
        assert!(Message::parse("not json at all").is_err());
    }

    #[test]
    fn parse_no_id_no_method() {
        assert!(Message::parse(r#"{"jsonrpc":"2.0"}"#).is_err());
    }

    #[test]
    fn to_json_request() {
        let msg = Message::request(1, "initialize", serde_json::json!({"a": 1}));
        let value = msg.to_json();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 1);
        assert_eq!(value["method"], "initialize");
        assert_eq!(value["params"]["a"], 1);
    }

    #[test]
    fn to_json_notification_has_no_id() {
        let msg = Message::notification("initialized", serde_json::json!({}));
        let value = msg.to_json();
        assert!(value.get("id").is_none());
        assert_eq!(value["method"], "initialized");
    }

    #[test]
    fn to_json_error_response() {
        let msg = Message::error_response("r1", -32601, "method not found");
        let value = msg.to_json();
        assert_eq!(value["id"], "r1");
        assert_eq!(value["error"]["code"], -32601);
        assert!(value.get("result").is_none());
    }

    #[test]
    fn round_trip_all_variants() {
        let messages = vec![
            Message::request(42, "textDocument/completion", serde_json::json!({"x": [1, 2]})),
            Message::request("str-id", "shutdown", serde_json::Value::Null),
            Message::response(42, serde_json::json!({"items": []})),
            Message::error_response(42, -32800, "request cancelled"),
            Message::notification("exit", serde_json::Value::Null),
        ];
        for msg in messages {
            let parsed = Message::parse(&msg.to_json().to_string()).unwrap();
            assert_eq!(parsed, msg);
        }
    }

    #[test]
    fn method_accessor() {
        assert_eq!(
            Message::notification("exit", serde_json::Value::Null).method(),
            Some("exit")
        );
        assert_eq!(
            Message::response(1, serde_json::Value::Null).method(),
            None
        );
    }
}
