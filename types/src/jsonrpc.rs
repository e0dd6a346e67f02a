//! JSON-RPC 2.0 envelopes exchanged over the MCP channel.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Protocol version string carried in every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Prefix reserved for notification method names.
pub const NOTIFICATION_PREFIX: &str = "notifications/";

// JSON-RPC 2.0 standard error codes.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// Server error range: a missing or unknown session.
pub const INVALID_SESSION: i32 = -32000;

// ============================================================================
// Inbound
// ============================================================================

/// JSON-RPC 2.0 request or notification as received from a client.
///
/// A missing `id` marks the envelope as a notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a request carrying an id.
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// Create a notification (no id, no reply expected).
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// True when the method name uses the reserved notification prefix.
    pub fn has_notification_method(&self) -> bool {
        self.method.starts_with(NOTIFICATION_PREFIX)
    }

    /// The request id, or JSON `null` when absent.
    pub fn id_or_null(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// JSON-RPC 2.0 response. Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Structured JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach diagnostic data. The message is left untouched.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, "Parse error").with_data(Value::String(detail.into()))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    /// Method-Not-Found with `{method, sessionId}` diagnostics.
    pub fn method_not_found(method: &str, session_id: Option<&str>) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}")).with_data(json!({
            "method": method,
            "sessionId": session_id.unwrap_or("missing"),
        }))
    }

    /// Generic internal error; `detail` goes to `data` only.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, "Internal error").with_data(Value::String(detail.into()))
    }

    pub fn invalid_session() -> Self {
        Self::new(INVALID_SESSION, "Invalid or missing session ID")
    }
}

/// Server-to-client notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Any message the server writes to a client stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OutboundMessage {
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

impl OutboundMessage {
    pub fn as_response(&self) -> Option<&JsonRpcResponse> {
        match self {
            OutboundMessage::Response(response) => Some(response),
            OutboundMessage::Notification(_) => None,
        }
    }

    pub fn as_notification(&self) -> Option<&JsonRpcNotification> {
        match self {
            OutboundMessage::Notification(notification) => Some(notification),
            OutboundMessage::Response(_) => None,
        }
    }
}

impl From<JsonRpcResponse> for OutboundMessage {
    fn from(response: JsonRpcResponse) -> Self {
        OutboundMessage::Response(response)
    }
}

impl From<JsonRpcNotification> for OutboundMessage {
    fn from(notification: JsonRpcNotification) -> Self {
        OutboundMessage::Notification(notification)
    }
}
