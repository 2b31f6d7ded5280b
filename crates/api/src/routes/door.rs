//! Door Routes

use crate::AppState;
use axum::extract::State;
use axum::Json;
use pipeline::ManualTestOutcome;
use std::sync::Arc;

/// The dashboard "test door" button: capture, detect, recognize, actuate.
///
/// Blocks until the recognizer answers; this path carries no timeout.
pub async fn manual_test(State(state): State<Arc<AppState>>) -> Json<ManualTestOutcome> {
    Json(state.system.manual_access_test().await)
}
