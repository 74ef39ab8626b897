//! Supportly API server

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use supportly_api::{routes::create_router, websocket::WebSocketState, AppState, Config};
use supportly_shared::{create_pool, run_migrations, JobQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (production uses real env vars)
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env().context("Invalid configuration")?;

    let pool = create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    let queue = JobQueue::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    tracing::info!("Job queue ready");

    let cors = cors_layer(&config)?;
    let bind_address = config.bind_address.clone();

    let state = AppState::new(config, pool, queue);
    let ws_state = state.ws_state.clone();
    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "Supportly API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(ws_state))
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// `RUST_LOG` filter (default `info,supportly_api=debug`); JSON lines when
/// `LOG_FORMAT=json`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,supportly_api=debug,supportly_shared=debug"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

/// Browser clients send the auth cookie, so the allowed origin must be
/// explicit rather than a wildcard
fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let origin = config.cors_origin.as_deref().unwrap_or(&config.public_url);
    let origin = HeaderValue::from_str(origin)
        .with_context(|| format!("Invalid CORS origin: {origin}"))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

/// Wait for Ctrl+C, then close open sockets so graceful shutdown can finish
async fn shutdown_signal(ws_state: WebSocketState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    ws_state.disconnect_all().await;
}
