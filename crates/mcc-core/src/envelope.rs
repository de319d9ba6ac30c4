//! Tolerant decoding of upstream response envelopes.
//!
//! The tool surface has answered in several shapes over time:
//!
//! - `{ok, result}` / `{ok: false, error}` envelopes,
//! - bare `{output}` bodies,
//! - content-part lists (`{content: [{type: "text", text}]}`), optionally with
//!   an authoritative `details` object alongside,
//! - raw JSON-in-a-string results.
//!
//! [`unwrap_tool_response`] maps all of them to one value or one error.

use crate::GatewayError;
use serde_json::{Map, Value};

/// Upper bound, in characters, on any detail text carried in an error.
pub const DETAIL_LIMIT: usize = 220;

const GENERIC_FAILURE: &str = "tool invocation failed";

/// Decode a tool invocation response body.
pub fn unwrap_tool_response(envelope: Value) -> Result<Value, GatewayError> {
    if let Some(message) = failure_message(&envelope) {
        return Err(GatewayError::ToolFailed(message));
    }

    let inner = match envelope {
        Value::Object(mut map) => match take_present(&mut map, "result")
            .or_else(|| take_present(&mut map, "output"))
        {
            Some(inner) => inner,
            None => Value::Object(map),
        },
        other => other,
    };

    if let Some(message) = failure_message(&inner) {
        return Err(GatewayError::ToolFailed(message));
    }

    match inner {
        Value::Object(mut map) => {
            if let Some(details) = take_present(&mut map, "details") {
                return Ok(details);
            }
            match map.remove("content") {
                Some(Value::Array(parts)) => Ok(from_content_parts(parts)
                    .unwrap_or_else(|parts| restore(map, Value::Array(parts)))),
                Some(other) => Ok(restore(map, other)),
                None => Ok(Value::Object(map)),
            }
        }
        Value::String(text) => Ok(decode_or_raw(text)),
        other => Ok(other),
    }
}

/// Decode a generic RPC response body: its `result` field, or the whole body.
pub fn unwrap_rpc_response(body: Value) -> Value {
    match body {
        Value::Object(mut map) => match take_present(&mut map, "result") {
            Some(result) => result,
            None => Value::Object(map),
        },
        other => other,
    }
}

/// Decode text as structured data.
pub fn parse_structured(text: &str) -> Result<Value, GatewayError> {
    serde_json::from_str(text.trim()).map_err(|e| GatewayError::Malformed(e.to_string()))
}

/// Short human-readable detail from an error response body.
///
/// Looks at `message`, `error.message`, `error` and `detail` in a JSON body,
/// then falls back to the raw text. The result is whitespace-collapsed and
/// bounded to [`DETAIL_LIMIT`] characters.
pub fn extract_detail(body: &str) -> Option<String> {
    let from_json = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| message_of(&v).or_else(|| non_empty_str(v.get("detail"))));
    let text = from_json.unwrap_or_else(|| body.to_string());
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    Some(bounded(&collapsed, DETAIL_LIMIT))
}

/// Truncate to `limit` characters, marking the cut with `...`.
pub fn bounded(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

fn from_content_parts(parts: Vec<Value>) -> Result<Value, Vec<Value>> {
    let json_idx = parts.iter().position(|p| part_type(p) == Some("json"));
    if let Some(idx) = json_idx {
        let mut part = parts.into_iter().nth(idx).unwrap_or(Value::Null);
        let value = part
            .get_mut("json")
            .map(Value::take)
            .filter(|v| !v.is_null())
            .or_else(|| part.get_mut("data").map(Value::take))
            .unwrap_or(Value::Null);
        return Ok(value);
    }

    let text = parts
        .iter()
        .filter(|p| part_type(p) == Some("text"))
        .find_map(|p| p.get("text").and_then(Value::as_str));
    match text {
        Some(text) => Ok(decode_or_raw(text.to_string())),
        None => Err(parts),
    }
}

fn decode_or_raw(text: String) -> Value {
    match parse_structured(&text) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(%err, "tool result is not structured, keeping raw text");
            Value::String(text)
        }
    }
}

/// Message for a value carrying an explicit failure marker.
fn failure_message(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    let failed = map.get("ok") == Some(&Value::Bool(false))
        || map.get("success") == Some(&Value::Bool(false))
        || map.get("isError") == Some(&Value::Bool(true));
    if !failed {
        return None;
    }
    let message = message_of(value)
        .or_else(|| first_text_part(value))
        .unwrap_or_else(|| GENERIC_FAILURE.to_string());
    Some(message)
}

/// First non-empty of `message`, `error.message`, `error`.
fn message_of(value: &Value) -> Option<String> {
    non_empty_str(value.get("message"))
        .or_else(|| non_empty_str(value.get("error").and_then(|e| e.get("message"))))
        .or_else(|| non_empty_str(value.get("error")))
}

fn first_text_part(value: &Value) -> Option<String> {
    value
        .get("content")?
        .as_array()?
        .iter()
        .filter(|p| part_type(p) == Some("text"))
        .find_map(|p| non_empty_str(p.get("text")))
}

fn part_type(part: &Value) -> Option<&str> {
    part.get("type").and_then(Value::as_str)
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn take_present(map: &mut Map<String, Value>, key: &str) -> Option<Value> {
    match map.remove(key) {
        Some(Value::Null) | None => None,
        Some(value) => Some(value),
    }
}

fn restore(mut map: Map<String, Value>, content: Value) -> Value {
    map.insert("content".to_string(), content);
    Value::Object(map)
}
