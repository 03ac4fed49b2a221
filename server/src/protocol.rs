//! JSON-RPC 2.0 message types.
//!
//! Only what the stdio transport needs: requests (with optional id -
//! id-less messages are notifications and get no response), successful
//! responses, and error responses with the standard code set.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// Absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::{JSONRPC_VERSION, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND};

    #[test]
    fn request_with_id_deserializes() {
        let req: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/list"
        }))
        .expect("deserialize");
        assert_eq!(req.id, Some(json!(7)));
        assert_eq!(req.method, "tools/list");
        assert_eq!(req.params, Value::Null);
    }

    #[test]
    fn notification_has_no_id() {
        let req: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .expect("deserialize");
        assert!(req.id.is_none());
    }

    #[test]
    fn result_response_omits_error() {
        let resp = JsonRpcResponse::result(json!(1), json!({"ok": true}));
        let serialized = serde_json::to_value(&resp).expect("serialize");
        assert_eq!(
            serialized,
            json!({"jsonrpc": JSONRPC_VERSION, "id": 1, "result": {"ok": true}})
        );
    }

    #[test]
    fn error_response_omits_result() {
        let resp = JsonRpcResponse::error(json!(2), METHOD_NOT_FOUND, "no such method");
        let serialized = serde_json::to_value(&resp).expect("serialize");
        assert_eq!(
            serialized,
            json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": 2,
                "error": {"code": METHOD_NOT_FOUND, "message": "no such method"}
            })
        );
    }
}
