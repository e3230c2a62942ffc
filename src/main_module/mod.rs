//! Server bootstrap, routing, and operational endpoints

pub mod health;
pub mod server;

use log::{error, info};

pub use health::health_check;
pub use server::{build_router, run_axum_server};

pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
