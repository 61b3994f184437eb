// =============================================================================
// Binance REST API Client: public market data
// =============================================================================
//
// Only unauthenticated endpoints are used. Transport and parse failures stop
// at this boundary: `fetch_series` logs them and returns an empty series.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, instrument, warn};

use super::MarketDataSource;
use crate::market_data::Candle;

/// Public Binance REST client.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceClient {
    /// Create a client against `base_url` (e.g. `https://api.binance.com`).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self { base_url, client })
    }

    /// GET /api/v3/klines.
    ///
    /// Returns the candles in the order the exchange delivers them (ascending
    /// open time).
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let url = klines_url(&self.base_url, symbol, interval, limit);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/klines request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse klines response")?;

        if !status.is_success() {
            anyhow::bail!("Binance GET /api/v3/klines returned {}: {}", status, body);
        }

        let candles = parse_klines(&body)?;
        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

impl MarketDataSource for BinanceClient {
    async fn fetch_series(&self, symbol: &str, interval: &str, limit: u32) -> Vec<Candle> {
        match self.get_klines(symbol, interval, limit).await {
            Ok(candles) => candles,
            Err(e) => {
                error!(symbol, interval, error = %e, "failed to fetch historical klines");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Build the klines request URL.
pub fn klines_url(base_url: &str, symbol: &str, interval: &str, limit: u32) -> String {
    format!(
        "{}/api/v3/klines?symbol={}&interval={}&limit={}",
        base_url.trim_end_matches('/'),
        symbol.to_uppercase(),
        interval,
        limit
    )
}

/// Parse the array-of-arrays klines body. Malformed rows are skipped.
pub fn parse_klines(body: &serde_json::Value) -> Result<Vec<Candle>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut candles = Vec::with_capacity(raw.len());
    for entry in raw {
        match Candle::from_kline_row(entry) {
            Ok(c) => candles.push(c),
            Err(e) => warn!(error = %e, "skipping malformed kline entry"),
        }
    }

    Ok(candles)
}
