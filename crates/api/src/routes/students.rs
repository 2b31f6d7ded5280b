//! Student Roster Routes

use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use storage::{RosterStats, Student};

/// Response for the students endpoint
#[derive(Debug, Serialize)]
pub struct StudentsResponse {
    pub data: Vec<Student>,
    pub count: usize,
}

/// All enrolled students
pub async fn get_students(State(state): State<Arc<AppState>>) -> Json<StudentsResponse> {
    let data = state.roster.all_students();
    Json(StudentsResponse {
        count: data.len(),
        data,
    })
}

/// Roster-wide statistics
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<RosterStats> {
    Json(state.roster.stats())
}
