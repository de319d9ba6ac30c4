//! Reshape loosely-typed upstream payloads into stable UI shapes.
//!
//! Tools disagree on where lists live (`sessions`, `items`, `entries`, ...)
//! and on field names, so every accessor here tries a fixed list of
//! candidates and takes the first that fits.

use chrono::{DateTime, SecondsFormat};
use serde::Serialize;
use serde_json::{Map, Value};

/// Timestamps above this are already milliseconds.
const MILLIS_THRESHOLD: f64 = 10_000_000_000.0;

/// First candidate that is an array, cloned. Empty if none is.
pub fn pick_array<'a>(candidates: impl IntoIterator<Item = Option<&'a Value>>) -> Vec<Value> {
    candidates
        .into_iter()
        .flatten()
        .find_map(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |v, k| v.get(k))
}

pub fn sessions(raw: &Value) -> Vec<Value> {
    pick_array([
        Some(raw),
        raw.get("sessions"),
        raw.get("items"),
        raw.get("history"),
        raw.get("entries"),
        path(raw, &["result", "sessions"]),
    ])
}

pub fn messages(raw: &Value) -> Vec<Value> {
    pick_array([
        raw.get("messages"),
        raw.get("history"),
        raw.get("items"),
        raw.get("entries"),
        Some(raw),
    ])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: String,
    pub display_name: String,
}

pub fn agents(raw: &Value) -> Vec<AgentRecord> {
    pick_array([
        Some(raw),
        raw.get("agents"),
        raw.get("items"),
        path(raw, &["result", "agents"]),
    ])
    .iter()
    .filter_map(agent_record)
    .collect()
}

fn agent_record(entry: &Value) -> Option<AgentRecord> {
    if let Some(id) = entry.as_str() {
        let id = id.trim();
        return (!id.is_empty()).then(|| AgentRecord {
            id: id.to_string(),
            display_name: id.to_string(),
        });
    }
    let id = first_text(entry, &["id", "agentId", "name"])?;
    let display_name = first_text(entry, &["displayName", "name"]).unwrap_or_else(|| id.clone());
    Some(AgentRecord { id, display_name })
}

/// Owning agent of a session: explicit field, else `agent:<id>:...` key.
pub fn infer_agent_id(session: &Value) -> String {
    if let Some(id) = first_text(session, &["agentId", "agent"]) {
        return id;
    }
    let key = first_text(session, &["sessionKey", "key"]).unwrap_or_default();
    let mut parts = key.split(':');
    match (parts.next(), parts.next()) {
        (Some("agent"), Some(id)) if !id.is_empty() => id.to_string(),
        _ => "unknown".to_string(),
    }
}

/// Most relevant activity time of a session, in epoch milliseconds.
///
/// Accepts numbers in seconds or milliseconds and RFC 3339 strings.
pub fn timestamp_ms(session: &Value) -> Option<i64> {
    ["updatedAt", "lastMessageAt", "lastActiveAt", "createdAt", "ts"]
        .iter()
        .filter_map(|k| session.get(k))
        .find_map(parse_timestamp)
}

fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            let n = n.as_f64().filter(|n| n.is_finite() && *n > 0.0)?;
            let ms = if n > MILLIS_THRESHOLD { n } else { n * 1000.0 };
            Some(ms as i64)
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|d| d.timestamp_millis())
            .filter(|ms| *ms > 0),
        _ => None,
    }
}

/// RFC 3339 rendering of epoch milliseconds.
pub fn iso_millis(ms: i64) -> Option<String> {
    DateTime::from_timestamp_millis(ms).map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Status-ish text of a session, lowercased.
pub fn session_status(session: &Value) -> Option<String> {
    first_text(session, &["status", "state"]).map(|s| s.to_lowercase())
}

/// UI row for one session.
pub fn session_row(session: &Value) -> Value {
    let get = |keys: &[&str]| {
        keys.iter()
            .filter_map(|k| session.get(k))
            .find(|v| !v.is_null())
            .cloned()
    };
    let mut row = Map::new();
    row.insert(
        "sessionKey".into(),
        get(&["sessionKey", "key"]).unwrap_or_else(|| Value::from("")),
    );
    row.insert(
        "label".into(),
        get(&["label", "displayName"]).unwrap_or_else(|| Value::from("")),
    );
    row.insert("kind".into(), get(&["kind"]).unwrap_or_else(|| Value::from("")));
    row.insert(
        "updatedAt".into(),
        get(&["updatedAt", "lastMessageAt", "lastActiveAt"]).unwrap_or(Value::Null),
    );
    row.insert(
        "lastMessage".into(),
        get(&["lastMessage", "preview"]).unwrap_or(Value::Null),
    );
    row.insert(
        "status".into(),
        get(&["status", "state"]).unwrap_or_else(|| Value::from("unknown")),
    );
    Value::Object(row)
}

/// Normalize memory search hits to carry `snippet`, `path` and `line`.
pub fn search_results(raw: &Value) -> Vec<Value> {
    pick_array([
        Some(raw),
        raw.get("results"),
        raw.get("items"),
        raw.get("matches"),
        raw.get("hits"),
    ])
    .into_iter()
    .filter_map(search_result)
    .collect()
}

fn search_result(entry: Value) -> Option<Value> {
    let Value::Object(mut map) = entry else {
        return None;
    };
    let snippet = first_text(
        &Value::Object(map.clone()),
        &["snippet", "text", "content", "chunk", "preview", "message"],
    )
    .unwrap_or_else(|| "(no snippet)".to_string());
    let source = ["path", "source", "file", "filePath"]
        .iter()
        .filter_map(|k| map.get(*k))
        .find_map(text_of)
        .unwrap_or_else(|| "unknown".to_string());
    let line = ["line", "lineNumber"]
        .iter()
        .filter_map(|k| map.get(*k))
        .find_map(Value::as_u64);

    map.insert("snippet".into(), Value::String(snippet));
    map.insert("path".into(), Value::String(source));
    match line {
        Some(line) => map.insert("line".into(), Value::from(line)),
        None => map.remove("line"),
    };
    Some(Value::Object(map))
}

/// First of `keys` holding a non-empty string or a number, as text.
fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|k| value.get(k)).find_map(text_of)
}

fn text_of(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}
