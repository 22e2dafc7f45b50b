// Keywarden: JSON-RPC 2.0 Protocol Types
//
// The handful of JSON-RPC 2.0 types the control socket needs, used by both
// the server and the `call` client. Application errors map onto codes in
// the implementation-defined -32000..-32099 range.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::distributor::DistributionError;
use crate::error::KeywardenError;
use crate::store::StoreError;

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// Application error codes
pub const KEY_NOT_FOUND: i32 = -32001;
pub const INVALID_TRANSITION: i32 = -32002;
pub const NO_ACTIVE_KEY: i32 = -32003;
pub const LOCK_CONTENTION: i32 = -32004;
pub const CONFIGURATION: i32 = -32005;
pub const REMOTE_FAILURE: i32 = -32006;

impl JsonRpcRequest {
    pub fn new(method: &str, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: Value::from(id),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.jsonrpc != "2.0" {
            return Err("jsonrpc must be \"2.0\"".to_string());
        }
        if self.method.is_empty() {
            return Err("method must not be empty".to_string());
        }
        Ok(())
    }

    /// Required string parameter, by name.
    pub fn str_param(&self, name: &str) -> Result<&str, String> {
        self.params
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("Missing '{}' parameter", name))
    }
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }

    /// The id is null: the request never parsed far enough to have one.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::error(Value::Null, PARSE_ERROR, message)
    }

    pub fn from_error(id: Value, err: &KeywardenError) -> Self {
        Self::error(id, error_code(err), err.to_string())
    }
}

/// JSON-RPC error code for a lifecycle failure.
pub fn error_code(err: &KeywardenError) -> i32 {
    if err.is_configuration() {
        return CONFIGURATION;
    }
    match err {
        KeywardenError::Store(StoreError::NotFound(_)) => KEY_NOT_FOUND,
        KeywardenError::Store(StoreError::InvalidTransition { .. })
        | KeywardenError::NotActive(_) => INVALID_TRANSITION,
        KeywardenError::NoActiveKey => NO_ACTIVE_KEY,
        KeywardenError::LockContention(_) => LOCK_CONTENTION,
        KeywardenError::Distribution(
            DistributionError::Http(_)
            | DistributionError::Timeout
            | DistributionError::Rejected { .. }
            | DistributionError::InvalidResponse(_),
        ) => REMOTE_FAILURE,
        _ => INTERNAL_ERROR,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
