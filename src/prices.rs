//! Token price client: polls a CoinGecko-compatible `simple/price`
//! endpoint for the donation tokens.
//!
//! ## Resilience
//!
//! * Exponential back-off is applied on transport errors and rate-limit
//!   responses, up to [`MAX_BACKOFF_SECS`] seconds.
//! * A well-formed response that lacks every requested token is a hard
//!   error; the caller decides whether to retry on the next cycle.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tracing::{debug, warn};

use crate::errors::{ApiError, Result};
use crate::models::TokenPrice;

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;

/// Donation tokens and the identifiers the price feed knows them by.
pub const DONATION_TOKENS: &[(&str, &str)] = &[("sol", "solana"), ("usdc", "usd-coin")];

/// Price-feed identifier for a donation token symbol, if supported.
pub fn feed_id(token: &str) -> Option<&'static str> {
    DONATION_TOKENS
        .iter()
        .find(|(symbol, _)| *symbol == token)
        .map(|(_, id)| *id)
}

/// Wire shape: `{"solana": {"usd": 123.45}, "usd-coin": {"usd": 1.0}}`.
type PriceMap = HashMap<String, HashMap<String, f64>>;

/// Fetch current USD quotes for all donation tokens.
pub async fn fetch_prices(client: &Client, price_api_url: &str) -> Result<Vec<TokenPrice>> {
    let ids = DONATION_TOKENS
        .iter()
        .map(|(_, id)| *id)
        .collect::<Vec<_>>()
        .join(",");
    let url = format!("{price_api_url}?ids={ids}&vs_currencies=usd");

    let mut backoff = INITIAL_BACKOFF_SECS;

    loop {
        let response = client.get(&url).send().await;

        match response {
            Err(e) => {
                warn!("Price request failed (will retry in {backoff}s): {e}");
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                continue;
            }
            Ok(resp) => {
                if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    warn!("Rate-limited by price API (will retry in {backoff}s)");
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }

                let body: PriceMap = resp.json().await?;
                let prices = decode_prices(&body, Utc::now().timestamp());

                if prices.is_empty() {
                    return Err(ApiError::PriceFeed(
                        "price response contained none of the requested tokens".to_string(),
                    ));
                }

                debug!("Fetched {} token quotes", prices.len());
                return Ok(prices);
            }
        }
    }
}

/// Pull the tracked tokens out of the decoded response map. Tokens the
/// response omits are skipped; stale cache entries stay untouched.
fn decode_prices(body: &PriceMap, fetched_at: i64) -> Vec<TokenPrice> {
    DONATION_TOKENS
        .iter()
        .filter_map(|(_, id)| {
            body.get(*id)
                .and_then(|quote| quote.get("usd"))
                .map(|usd| TokenPrice {
                    token: (*id).to_string(),
                    usd: *usd,
                    fetched_at,
                })
        })
        .collect()
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(json: &str) -> PriceMap {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn feed_id_lookup() {
        assert_eq!(feed_id("sol"), Some("solana"));
        assert_eq!(feed_id("usdc"), Some("usd-coin"));
        assert_eq!(feed_id("doge"), None);
    }

    #[test]
    fn decode_full_response() {
        let body = wire(r#"{"solana":{"usd":142.5},"usd-coin":{"usd":1.0}}"#);
        let prices = decode_prices(&body, 99);
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].token, "solana");
        assert_eq!(prices[0].usd, 142.5);
        assert_eq!(prices[0].fetched_at, 99);
        assert_eq!(prices[1].token, "usd-coin");
        assert_eq!(prices[1].usd, 1.0);
    }

    #[test]
    fn decode_skips_missing_tokens() {
        let body = wire(r#"{"solana":{"usd":142.5}}"#);
        let prices = decode_prices(&body, 0);
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].token, "solana");
    }

    #[test]
    fn decode_ignores_other_currencies_and_tokens() {
        let body = wire(r#"{"solana":{"eur":130.0},"bitcoin":{"usd":60000.0}}"#);
        assert!(decode_prices(&body, 0).is_empty());
    }
}
