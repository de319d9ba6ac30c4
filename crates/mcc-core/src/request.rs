//! Outbound request bodies.
//!
//! Each call shape has exactly one wire form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generic RPC call: `{method, params}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default = "empty_object")]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: object_or_empty(params),
        }
    }
}

/// Named tool invocation: `{tool, args, details}`.
///
/// `details` asks upstream to include its structured detail object in the
/// result, which the unwrapping layer prefers when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default = "empty_object")]
    pub args: Value,
    #[serde(default)]
    pub details: bool,
}

impl ToolRequest {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args: object_or_empty(args),
            details: true,
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn object_or_empty(value: Value) -> Value {
    match value {
        Value::Null => empty_object(),
        other => other,
    }
}
