//! Agents, sessions and host health at a glance.

use super::{ApiError, AppState, query_number};
use crate::host::{self, HostInfo};
use crate::normalize::{self, AgentRecord};
use axum::Json;
use axum::extract::{Path, Query, State};
use mcc_gateway::{ConnectionStatus, GatewayError};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path as FsPath;

/// A session touched this recently keeps its agent busy.
const BUSY_WINDOW_MS: i64 = 120_000;
const BUSY_MARKERS: [&str; 3] = ["running", "busy", "active"];

#[derive(Debug, Serialize)]
pub struct Overview {
    gateway: ConnectionStatus,
    host: HostInfo,
    agents: Vec<AgentCard>,
    warnings: Vec<String>,
    totals: Totals,
}

#[derive(Debug, Serialize)]
struct Totals {
    sessions: usize,
    agents: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub agent_id: String,
    pub display_name: String,
    pub active_sessions: usize,
    pub last_heartbeat: Option<String>,
    pub state: &'static str,
}

pub async fn overview(State(state): State<AppState>) -> Result<Json<Overview>, ApiError> {
    let gateway = &state.gateway;
    let (sessions, agents, configured) = tokio::join!(
        gateway.invoke_tool("sessions_list", json!({"limit": 500, "messageLimit": 0})),
        gateway.invoke_tool("agents_list", json!({})),
        configured_agent_ids(&state.paths.agents_file),
    );

    let mut warnings = Vec::new();
    let sessions = sessions
        .map(|raw| normalize::sessions(&raw))
        .unwrap_or_else(|err| {
            warnings.push(format!("sessions_list failed: {err}"));
            Vec::new()
        });
    let agents = agents
        .map(|raw| normalize::agents(&raw))
        .unwrap_or_else(|err| {
            warnings.push(format!("agents_list failed: {err}"));
            Vec::new()
        });

    if configured.len() > agents.len() {
        warnings.push(format!(
            "Gateway tool scope currently exposes {} allowlisted agent(s) while {} are configured on host.",
            agents.len(),
            configured.len()
        ));
    }

    let cards = agent_cards(&sessions, &agents, &configured, mcc_core::epoch_millis() as i64);
    let host = tokio::task::spawn_blocking(host::snapshot)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(Overview {
        gateway: gateway.status(),
        host,
        totals: Totals {
            sessions: sessions.len(),
            agents: cards.len(),
        },
        agents: cards,
        warnings,
    }))
}

/// Agent ids listed under `agents.list[].id` in the host's runtime config.
/// A missing or unreadable file means none.
async fn configured_agent_ids(path: &FsPath) -> Vec<String> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "no host agent config");
            return Vec::new();
        }
    };
    let raw: Value = match serde_json::from_str(&text) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "host agent config is not valid JSON");
            return Vec::new();
        }
    };
    raw.pointer("/agents/list")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|a| a.get("id"))
        .filter_map(|id| match id {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|id| !id.is_empty())
        .collect()
}

/// One card per agent seen in sessions, the gateway's agent list or the host
/// config, sorted by display name.
pub fn agent_cards(
    sessions: &[Value],
    agents: &[AgentRecord],
    configured: &[String],
    now_ms: i64,
) -> Vec<AgentCard> {
    let mut names: HashMap<&str, &str> = agents
        .iter()
        .map(|a| (a.id.as_str(), a.display_name.as_str()))
        .collect();
    let mut order: Vec<String> = Vec::new();
    let mut by_agent: HashMap<String, Vec<&Value>> = HashMap::new();

    let mut touch = |id: String| -> String {
        if !by_agent.contains_key(&id) {
            order.push(id.clone());
            by_agent.insert(id.clone(), Vec::new());
        }
        id
    };
    let owners: Vec<String> = sessions
        .iter()
        .map(|s| touch(normalize::infer_agent_id(s)))
        .collect();
    for agent in agents {
        touch(agent.id.clone());
    }
    for id in configured {
        touch(id.clone());
        names.entry(id.as_str()).or_insert(id.as_str());
    }
    for (owner, session) in owners.iter().zip(sessions) {
        if let Some(list) = by_agent.get_mut(owner) {
            list.push(session);
        }
    }

    let mut cards: Vec<AgentCard> = order
        .into_iter()
        .map(|agent_id| {
            let list = by_agent.remove(&agent_id).unwrap_or_default();
            let last = list.iter().filter_map(|s| normalize::timestamp_ms(s)).max();
            let busy = list.iter().any(|s| is_busy(s, now_ms));
            AgentCard {
                display_name: names
                    .get(agent_id.as_str())
                    .map_or_else(|| agent_id.clone(), |n| n.to_string()),
                active_sessions: list.len(),
                last_heartbeat: last.and_then(normalize::iso_millis),
                state: if busy { "busy" } else { "idle" },
                agent_id,
            }
        })
        .collect();
    cards.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
    cards
}

fn is_busy(session: &Value, now_ms: i64) -> bool {
    let status = normalize::session_status(session).unwrap_or_default();
    if BUSY_MARKERS.iter().any(|m| status.contains(m)) {
        return true;
    }
    normalize::timestamp_ms(session).is_some_and(|ts| now_ms - ts < BUSY_WINDOW_MS)
}

/// Sessions belonging to one agent.
pub async fn agent_sessions(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let raw = state
        .gateway
        .invoke_tool("sessions_list", json!({"limit": 500, "messageLimit": 1}))
        .await
        .map_err(|e| ApiError::upstream(e).context("Failed to load sessions"))?;

    let sessions: Vec<Value> = normalize::sessions(&raw)
        .iter()
        .filter(|s| normalize::infer_agent_id(s) == agent_id)
        .map(normalize::session_row)
        .collect();
    Ok(Json(json!({ "agentId": agent_id, "sessions": sessions })))
}

pub async fn session_history(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let limit: u32 = query_number(&params, "limit")?.unwrap_or(100);
    let args = json!({
        "sessionKey": session_key,
        "limit": limit,
        "includeTools": false,
    });
    let out = state
        .gateway
        .invoke_tool("sessions_history", args)
        .await
        .map_err(|e: GatewayError| ApiError::upstream(e).context("Failed to load history"))?;

    Ok(Json(json!({
        "sessionKey": session_key,
        "messages": normalize::messages(&out),
    })))
}
