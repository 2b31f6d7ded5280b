//! Event Log Routes

use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::LogKind;

/// Query parameters for the recent-logs endpoint
#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for the recent-logs endpoint
#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub kind: String,
    pub data: Vec<serde_json::Value>,
    pub count: usize,
}

/// Recent records of one kind, newest first
pub async fn get_recent(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(params): Query<LogQuery>,
) -> impl IntoResponse {
    let Some(log_kind) = LogKind::from_name(&kind) else {
        return (
            StatusCode::BAD_REQUEST,
            format!("unknown log kind: {kind}"),
        )
            .into_response();
    };

    let data = state.log.recent(log_kind, params.limit);
    Json(LogResponse {
        kind,
        count: data.len(),
        data,
    })
    .into_response()
}
