//! Grantboard backend — entry point.
//!
//! Starts a background task that keeps token prices fresh and exposes the
//! Axum REST API behind the project explorer, the round schedule and the
//! donation flow.

mod api;
mod config;
mod db;
mod errors;
mod explore;
mod models;
mod pricefeed;
mod prices;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use pricefeed::PriceFeedState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client shared with the price feed.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    // ─── Background price feed ────────────────────────────
    let feed_state = Arc::new(PriceFeedState {
        pool: pool.clone(),
        config: config.clone(),
        client,
    });
    tokio::spawn(pricefeed::run(feed_state));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState { pool });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/projects/verified", get(api::get_verified_projects))
        .route("/projects/:id/contributors", get(api::get_project_contributors))
        .route("/rounds", get(api::get_rounds))
        .route("/contributions", post(api::create_contribution))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
