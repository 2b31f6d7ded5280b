//! Camera Routes

use crate::AppState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Camera status response
#[derive(Debug, Serialize)]
pub struct CameraStatusResponse {
    pub is_active: bool,
    pub frame_count: u64,
    pub fps: f32,
    pub target_fps: u32,
    pub resolution: String,
    pub callback_count: usize,
    pub buffer_size: usize,
    pub has_frame: bool,
}

/// Lifecycle action response
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

/// Get camera performance stats
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<CameraStatusResponse> {
    let stats = state.system.camera().stats();
    Json(CameraStatusResponse {
        is_active: stats.is_active,
        frame_count: stats.frame_count,
        fps: stats.fps,
        target_fps: stats.target_fps,
        resolution: stats.resolution,
        callback_count: stats.callback_count,
        buffer_size: stats.buffer_len,
        has_frame: stats.has_frame,
    })
}

/// Start the capture loop
pub async fn start_camera(State(state): State<Arc<AppState>>) -> Json<ActionResponse> {
    match state.system.camera().start() {
        Ok(()) => Json(ActionResponse {
            success: true,
            message: "Camera started".to_string(),
        }),
        Err(e) => Json(ActionResponse {
            success: false,
            message: e.to_string(),
        }),
    }
}

/// Stop the capture loop
pub async fn stop_camera(State(state): State<Arc<AppState>>) -> Json<ActionResponse> {
    state.system.camera().stop();
    Json(ActionResponse {
        success: true,
        message: "Camera stopped".to_string(),
    })
}

/// Latest frame as a PNG, served off the freshness buffer
pub async fn snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(frame) = state.system.camera().get_latest_frame_fast() else {
        return (StatusCode::NOT_FOUND, "no frame captured yet").into_response();
    };

    let Some(buffer) = image::RgbImage::from_raw(frame.width, frame.height, frame.data) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "frame buffer corrupt").into_response();
    };

    let mut bytes = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut bytes);
    if image::DynamicImage::ImageRgb8(buffer)
        .write_to(&mut cursor, image::ImageFormat::Png)
        .is_err()
    {
        return (StatusCode::INTERNAL_SERVER_ERROR, "encode failed").into_response();
    }

    ([(header::CONTENT_TYPE, "image/png")], bytes).into_response()
}
