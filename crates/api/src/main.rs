//! Classroom Pipeline - Main Entry Point

use api::{init_logging, run_server, AppState};
use pipeline::{ClassroomSystem, Settings};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("=== Classroom Pipeline v{} ===", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    let addr = settings.bind_addr();

    let system = Arc::new(ClassroomSystem::new(settings)?);
    system.start().await?;

    let state = Arc::new(AppState::new(Arc::clone(&system))?);

    let serve_result = run_server(&addr, state, shutdown_signal()).await;

    info!("Shutting down...");
    system.stop().await;

    serve_result
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("Failed to listen for ctrl-c, shutting down immediately");
    }
}
