//! JSON-RPC 2.0 message types used by MCP.
//!
//! Incoming lines are either requests (carrying an `id`, answered with a
//! response or an error) or notifications (no `id`, never answered).
//! IDs are strings or integers; `null` is rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The MCP protocol version this server speaks.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name reported during initialisation.
pub const SERVER_NAME: &str = "tableau-mcp";

/// A JSON-RPC request ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric ID.
    Number(i64),
    /// String ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A request from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Always "2.0".
    pub jsonrpc: String,
    /// Request identifier, echoed in the reply.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Decodes the parameters into `T`, treating absent params as an error.
    ///
    /// # Errors
    ///
    /// Returns an invalid-params error naming `what` if the parameters are
    /// missing or do not match `T`.
    pub fn parse_params<T: serde::de::DeserializeOwned>(
        &self,
        what: &str,
    ) -> Result<T, JsonRpcError> {
        let params = self.params.clone().ok_or_else(|| {
            JsonRpcError::invalid_params(self.id.clone(), format!("Missing {what} params"))
        })?;
        serde_json::from_value(params).map_err(|e| {
            JsonRpcError::invalid_params(self.id.clone(), format!("Invalid {what} params: {e}"))
        })
    }
}

/// A notification from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    /// Always "2.0".
    pub jsonrpc: String,
    /// Notification name.
    pub method: String,
    /// Notification parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

/// A successful reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,
    /// ID of the request being answered.
    pub id: RequestId,
    /// Method result.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a success reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// Standard JSON-RPC error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The line is not valid JSON.
    ParseError,
    /// The JSON is not a valid request.
    InvalidRequest,
    /// Unknown method.
    MethodNotFound,
    /// Bad method parameters.
    InvalidParams,
    /// Failure inside the server.
    InternalError,
}

impl ErrorCode {
    /// Numeric value sent on the wire.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }

    /// Message used when no more specific one is given.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// The `error` member of an error reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// Error code.
    pub code: i32,
    /// Short description.
    pub message: String,
}

impl JsonRpcErrorData {
    /// Creates error data with a custom message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }
}

impl From<ErrorCode> for JsonRpcErrorData {
    fn from(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }
}

/// An error reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,
    /// ID of the request being answered; `null` when it could not be read.
    pub id: Option<RequestId>,
    /// Error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates an error reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error,
        }
    }

    /// The line was not JSON.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(None, ErrorCode::ParseError.into())
    }

    /// The JSON was not a valid request.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, ErrorCode::InvalidRequest.into())
    }

    /// A request arrived before the initialisation handshake finished.
    #[must_use]
    pub fn not_initialised(id: RequestId) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::new(ErrorCode::InvalidRequest, "Server not initialised"),
        )
    }

    /// The method is not implemented.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::new(ErrorCode::MethodNotFound, format!("Method not found: {method}")),
        )
    }

    /// The parameters were missing or malformed.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::new(ErrorCode::InvalidParams, message),
        )
    }

    /// Something failed inside the server.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::new(ErrorCode::InternalError, message),
        )
    }
}

/// A decoded line: request or notification.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// Expects a reply.
    Request(JsonRpcRequest),
    /// Expects no reply.
    Notification(JsonRpcNotification),
}

impl IncomingMessage {
    /// Method name of the message.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Request(req) => &req.method,
            Self::Notification(notif) => &notif.method,
        }
    }

    /// Request ID, for requests.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Notification(_) => None,
        }
    }
}

/// Decodes one line of input.
///
/// # Errors
///
/// Returns a parse error for invalid JSON and an invalid-request error for
/// JSON that is not a JSON-RPC 2.0 request or notification. When the request
/// ID can be recovered it is included in the error.
pub fn parse_message(line: &str) -> Result<IncomingMessage, JsonRpcError> {
    let value: Value = serde_json::from_str(line).map_err(|_| JsonRpcError::parse_error())?;
    let Some(obj) = value.as_object() else {
        return Err(JsonRpcError::invalid_request(None));
    };

    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        let id = obj
            .get("id")
            .and_then(|id| serde_json::from_value(id.clone()).ok());
        return Err(JsonRpcError::invalid_request(id));
    }

    if obj.contains_key("id") {
        let request: JsonRpcRequest =
            serde_json::from_value(value).map_err(|_| JsonRpcError::invalid_request(None))?;
        if request.method.is_empty() {
            return Err(JsonRpcError::invalid_request(Some(request.id)));
        }
        Ok(IncomingMessage::Request(request))
    } else {
        let notification: JsonRpcNotification =
            serde_json::from_value(value).map_err(|_| JsonRpcError::invalid_request(None))?;
        Ok(IncomingMessage::Notification(notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tools_call_request() {
        let line = r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"check_dataset"}}"#;
        let IncomingMessage::Request(req) = parse_message(line).unwrap() else {
            panic!("Expected Request");
        };
        assert_eq!(req.id, RequestId::Number(7));
        assert_eq!(req.method, "tools/call");
        assert!(req.params.is_some());
    }

    #[test]
    fn parse_initialized_notification() {
        let msg = parse_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .unwrap();
        assert!(msg.id().is_none());
        assert_eq!(msg.method(), "notifications/initialized");
    }

    #[test]
    fn string_ids_are_kept() {
        let msg = parse_message(r#"{"jsonrpc":"2.0","id":"req-1","method":"ping"}"#).unwrap();
        assert_eq!(msg.id(), Some(&RequestId::String("req-1".to_string())));
    }

    #[test]
    fn null_id_is_invalid() {
        let err = parse_message(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).unwrap_err();
        assert_eq!(err.error.code, ErrorCode::InvalidRequest.code());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_message("{not json").unwrap_err();
        assert_eq!(err.error.code, ErrorCode::ParseError.code());
        assert!(err.id.is_none());

        let wire = serde_json::to_value(&err).unwrap();
        assert_eq!(wire["id"], Value::Null);
        assert!(wire.as_object().unwrap().contains_key("id"));
    }

    #[test]
    fn wrong_version_keeps_the_id() {
        let err = parse_message(r#"{"jsonrpc":"1.0","id":3,"method":"ping"}"#).unwrap_err();
        assert_eq!(err.error.code, ErrorCode::InvalidRequest.code());
        assert_eq!(err.id, Some(RequestId::Number(3)));
    }

    #[test]
    fn non_object_is_invalid_request() {
        let err = parse_message("[1, 2, 3]").unwrap_err();
        assert_eq!(err.error.code, ErrorCode::InvalidRequest.code());
    }

    #[test]
    fn missing_params_are_reported() {
        let IncomingMessage::Request(req) =
            parse_message(r#"{"jsonrpc":"2.0","id":1,"method":"tools/call"}"#).unwrap()
        else {
            panic!("Expected Request");
        };
        let err = req.parse_params::<Value>("tool call").unwrap_err();
        assert_eq!(err.error.code, ErrorCode::InvalidParams.code());
        assert_eq!(err.error.message, "Missing tool call params");
    }

    #[test]
    fn error_reply_shape() {
        let err = JsonRpcError::method_not_found(RequestId::Number(1), "resources/list");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32601, "message": "Method not found: resources/list"}
            })
        );
    }
}
