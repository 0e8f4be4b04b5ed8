use anyhow::Result;
use std::net::SocketAddr;

mod handlers;
mod routes;
mod state;

use common::config::Settings;
use common::db::DbPool;
use common::telemetry;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Settings::load()?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    // Initialize structured logging
    telemetry::init_logging(&config.observability.log_level)?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting report service API"
    );

    // Initialize database connection pool
    let db_pool = DbPool::new(&config.database).await?;
    tracing::info!("Database connection pool established");

    // Run migrations
    sqlx::migrate!("../migrations").run(db_pool.pool()).await?;
    tracing::info!("Database migrations applied");

    // Initialize Prometheus metrics exporter
    telemetry::init_metrics(config.observability.metrics_port)?;

    // Create application state and router
    let state = AppState::new(db_pool.clone(), &config);
    let app = routes::create_router(state);

    // Start server
    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    tracing::info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await;
    tracing::info!("API server stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Initiating graceful shutdown");
}
