//! services/api/src/bin/api.rs

use attendance_api::{
    adapters::{relay_inserts, DbAdapter},
    config::Config,
    error::ApiError,
    web::{build_router, rest::ApiDoc, AppState},
};
use attendance_core::NotificationChannel;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    let shutdown = CancellationToken::new();

    // --- 2. Choose the Store ---
    let app_state = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");

            // New rows reach the live feed through LISTEN/NOTIFY.
            let channel = NotificationChannel::with_buffer(config.notify_buffer);
            let relay = tokio::spawn(relay_inserts(db_pool, channel.clone(), shutdown.clone()));
            tokio::spawn(async move {
                match relay.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("Attendance insert relay failed to start: {}", e),
                    Err(e) => error!("Attendance insert relay panicked: {}", e),
                }
            });

            AppState::new(config.clone(), db_adapter, channel)
        }
        None => {
            warn!("DATABASE_URL is not set; attendance is kept in memory and lost on restart.");
            AppState::in_memory(config.clone())
        }
    };

    // --- 3. Create the Web Router ---
    let app = Router::new()
        .merge(build_router(Arc::new(app_state)))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 4. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received.");
    shutdown.cancel();
}
