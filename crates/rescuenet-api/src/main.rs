//! RescueNet API server entry point.

use std::sync::Arc;

use rescuenet_api::config::AppConfig;
use rescuenet_api::error::AppError;
use rescuenet_api::state::AppState;
use rescuenet_api::{app, telemetry};
use rescuenet_core::clock::SystemClock;
use rescuenet_store::schema::MIGRATOR;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let _telemetry = telemetry::init()?;

    tracing::info!("Starting RescueNet API server");

    let config = AppConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    MIGRATOR.run(&pool).await?;

    let app_state = AppState::from_pool(pool, Arc::new(SystemClock), config.dispatch);

    // TODO: Replace CorsLayer::permissive() with the dispatch console's origin.
    let app = app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_address()?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
