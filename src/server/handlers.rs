//! JSON endpoints for observing the relay.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use super::AppState;
use crate::source;

#[derive(Debug, Deserialize)]
pub struct LastLinesQuery {
    pub lines: Option<usize>,
}

pub async fn index(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "message": "Tail relay is running",
        "connections": state.broadcaster.connection_count().await,
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn last_lines(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LastLinesQuery>,
) -> Json<Value> {
    let path = state.tailer.path();
    let lines = source::read_last_n_lines(path, query.lines.unwrap_or(state.initial_lines)).await;

    Json(json!({
        "count": lines.len(),
        "lines": lines,
        "file_size": source::file_size(path).await,
    }))
}

pub async fn file_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    let path = state.tailer.path();

    Json(json!({
        "file_path": path.display().to_string(),
        "file_size": source::file_size(path).await,
        "exists": source::file_exists(path).await,
    }))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = state.tailer.config();

    Json(json!({
        "server": "running",
        "connections": state.broadcaster.stats().await,
        "file_watcher": state.tailer.status().await,
        "config": {
            "log_file_path": config.path.display().to_string(),
            "initial_lines": state.initial_lines,
            "poll_interval": config.poll_interval.as_secs_f64(),
        },
    }))
}
