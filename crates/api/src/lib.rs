//! Classroom Dashboard API Server
//!
//! REST surface over the classroom pipeline: health, camera lifecycle and
//! snapshots, the manual door test, the student roster, and recent event
//! logs.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use pipeline::ClassroomSystem;
use serde::Serialize;
use std::sync::Arc;
use storage::{EventLog, Roster, StorageError};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

pub mod rate_limit;
mod routes;

/// Application state shared across handlers.
///
/// This is the only way routes reach the pipeline; there are no
/// module-level singletons anywhere.
pub struct AppState {
    pub system: Arc<ClassroomSystem>,
    pub roster: Roster,
    pub log: Arc<EventLog>,
    pub version: String,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(system: Arc<ClassroomSystem>) -> Result<Self, StorageError> {
        let roster = Roster::new(&system.settings().storage.dataset_path)?;
        let log = system.event_log();
        Ok(Self {
            system,
            roster,
            log,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        })
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
    pub metrics: SystemMetrics,
}

/// Component statuses
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub camera: ComponentHealth,
    pub pipeline: ComponentHealth,
    pub door: ComponentHealth,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
}

/// Headline metrics
#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub recognized_students: usize,
    pub successful_recognitions: u64,
    pub failed_recognitions: u64,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/system/status", get(status_handler))
        .route("/api/camera/status", get(routes::camera::get_status))
        .route("/api/camera/start", post(routes::camera::start_camera))
        .route("/api/camera/stop", post(routes::camera::stop_camera))
        .route("/api/camera/snapshot", get(routes::camera::snapshot))
        .route("/api/door/test", post(routes::door::manual_test))
        .route("/api/students", get(routes::students::get_students))
        .route("/api/students/stats", get(routes::students::get_stats))
        .route("/api/logs/:kind", get(routes::logs::get_recent))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let status = state.system.status();
    let door_connected = state.system.door_connected().await;

    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus {
            camera: ComponentHealth {
                status: if state.system.camera().is_active() {
                    "ok".to_string()
                } else {
                    "inactive".to_string()
                },
            },
            pipeline: ComponentHealth {
                status: if status.is_running {
                    "ok".to_string()
                } else {
                    "stopped".to_string()
                },
            },
            door: ComponentHealth {
                status: if door_connected {
                    "ok".to_string()
                } else {
                    "disconnected".to_string()
                },
            },
        },
        metrics: SystemMetrics {
            recognized_students: status.recognized_students.len(),
            successful_recognitions: status.stats.successful_recognitions,
            failed_recognitions: status.stats.failed_recognitions,
        },
    };

    Json(response)
}

/// Pipeline status handler
async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.system.status())
}

/// Initialize logging
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Run the server until shutdown.
///
/// Rate limiting keys on peer IPs, so the service is built with connect
/// info (see `rate_limit`).
pub async fn run_server(
    addr: &str,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), anyhow::Error> {
    let governor = rate_limit::create_governor_config(&rate_limit::RateLimitConfig::default());
    let app = create_router(state).layer(tower_governor::GovernorLayer { config: governor });

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}
