//! Skill catalogue read from the workspace.

use super::AppState;
use crate::skills;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};

pub async fn list(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let workspace = state.paths.workspace.clone();
    let root = skills::slash_path(
        skills::root(&workspace)
            .strip_prefix(&workspace)
            .unwrap_or(&workspace),
    );
    let listed = tokio::task::spawn_blocking(move || skills::list(&workspace))
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r.map_err(|e| e.to_string()));

    match listed {
        Ok(found) => (
            StatusCode::OK,
            Json(json!({
                "source": skills::SOURCE,
                "root": root,
                "count": found.len(),
                "skills": found,
            })),
        ),
        Err(err) => {
            tracing::error!(%err, "failed to enumerate skills");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": format!("Failed to enumerate skills: {err}"),
                    "source": skills::SOURCE,
                    "root": root,
                    "count": 0,
                    "skills": [],
                })),
            )
        }
    }
}
