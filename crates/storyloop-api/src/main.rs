//! Storyloop API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use storyloop_api::config::Config;
use storyloop_api::dispatcher::HttpGenerationDispatcher;
use storyloop_api::error::AppError;
use storyloop_api::routes;
use storyloop_api::state::AppState;
use storyloop_core::env::{RandomIds, SystemClock};
use storyloop_store::pg_game_store::PgGameStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Storyloop API server");

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    storyloop_store::MIGRATOR.run(&pool).await?;

    let dispatcher =
        HttpGenerationDispatcher::new(&config.generation_worker_url, config.dispatch_timeout)?;
    let app_state = AppState::new(
        Arc::new(SystemClock),
        Arc::new(RandomIds),
        Arc::new(PgGameStore::new(pool)),
        Arc::new(dispatcher),
        config.engine,
    );

    // TODO: Replace CorsLayer::permissive() with the web client's origin once it is fixed.
    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::game::router())
        .nest("/api/v1/players", routes::player::router())
        .nest("/internal/v1/generation", routes::internal::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
