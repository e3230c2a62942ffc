use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;

use ticketserver::config::AppConfig;
use ticketserver::llm::GeminiClient;
use ticketserver::main_module::run_axum_server;
use ticketserver::shared::state::AppState;
use ticketserver::shared::utils::{create_conn, run_migrations};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env()
        .map_err(|e| std::io::Error::other(format!("Failed to load config: {}", e)))?;

    let pool = match create_conn(&config.database_url()) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to create database pool: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("Database pool creation failed: {}", e),
            ));
        }
    };

    if let Err(e) = run_migrations(&pool) {
        error!("Failed to run migrations: {}", e);
        return Err(std::io::Error::other(format!("Migration failed: {}", e)));
    }

    if config.llm.api_key.is_empty() {
        warn!("GEMINI_API_KEY is not set; classification will return no suggestions");
    }
    let llm_provider = Arc::new(GeminiClient::new(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
    ));

    let app_state = Arc::new(AppState {
        config: config.clone(),
        conn: pool,
        llm_provider,
    });

    info!(
        "Starting HTTP server on {}:{}",
        config.server.host, config.server.port
    );
    run_axum_server(app_state, &config.server.host, config.server.port).await
}
