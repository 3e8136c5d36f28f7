//! Long-running background task that keeps the token price cache fresh.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::config::Config;
use crate::db;
use crate::prices;

pub struct PriceFeedState {
    pub pool: SqlitePool,
    pub config: Config,
    pub client: Client,
}

/// Spawn the refresh loop as a background [`tokio`] task.
pub async fn run(state: Arc<PriceFeedState>) {
    info!("Price feed starting, source: {}", state.config.price_api_url);

    loop {
        match refresh_once(&state.pool, &state.client, &state.config).await {
            Ok(count) => info!("Refreshed {count} token quotes"),
            Err(e) => {
                error!("Price refresh error: {e}");
            }
        }

        tokio::time::sleep(Duration::from_secs(state.config.price_refresh_secs)).await;
    }
}

/// Perform a single fetch-and-store iteration.
async fn refresh_once(
    pool: &SqlitePool,
    client: &Client,
    config: &Config,
) -> crate::errors::Result<usize> {
    let quotes = prices::fetch_prices(client, &config.price_api_url).await?;
    db::upsert_prices(pool, &quotes).await
}
