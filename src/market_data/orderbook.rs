// =============================================================================
// Order Book Cache: latest-snapshot replace of the partial depth stream
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

use super::candle::parse_string_f64;

/// Depth levels kept per side, matching the `@depth20` stream.
pub const MAX_LEVELS: usize = 20;

/// One `(price, quantity)` level of the book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Latest known market depth for a symbol, as delivered by the stream.
///
/// Level order is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub symbol: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub last_update_id: u64,
    /// Local receive time, ms since epoch.
    pub received_at: i64,
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// Spread in basis points of the mid price.
    pub fn spread_bps(&self) -> Option<f64> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        let mid = (bid + ask) / 2.0;
        if mid > 0.0 {
            Some(((ask - bid) / mid) * 10_000.0)
        } else {
            None
        }
    }

    /// Copy of the snapshot limited to the top `depth` levels per side.
    pub fn top(&self, depth: usize) -> Self {
        Self {
            symbol: self.symbol.clone(),
            bids: self.bids.iter().take(depth).copied().collect(),
            asks: self.asks.iter().take(depth).copied().collect(),
            last_update_id: self.last_update_id,
            received_at: self.received_at,
        }
    }
}

// ---------------------------------------------------------------------------
// OrderBookCache
// ---------------------------------------------------------------------------

/// Holds the most recent snapshot for the active symbol.
///
/// Each accepted update replaces the previous snapshot in a single
/// assignment. Updates tagged with any symbol other than the active one are
/// dropped, so a late delivery from a released subscription cannot overwrite
/// the book of the newly selected symbol.
pub struct OrderBookCache {
    active_symbol: RwLock<Option<String>>,
    latest: RwLock<Option<OrderBookSnapshot>>,
    version: AtomicU64,
}

impl OrderBookCache {
    pub fn new() -> Self {
        Self {
            active_symbol: RwLock::new(None),
            latest: RwLock::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// Make `symbol` the active symbol and discard any held snapshot.
    pub fn activate(&self, symbol: &str) {
        *self.active_symbol.write() = Some(symbol.to_uppercase());
        *self.latest.write() = None;
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Clear the active symbol and the held snapshot.
    pub fn deactivate(&self) {
        *self.active_symbol.write() = None;
        *self.latest.write() = None;
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn active_symbol(&self) -> Option<String> {
        self.active_symbol.read().clone()
    }

    /// Replace the held snapshot. Returns `false` if the update was dropped
    /// because it does not belong to the active symbol.
    pub fn on_update(&self, snapshot: OrderBookSnapshot) -> bool {
        let active = self.active_symbol.read();
        match active.as_deref() {
            Some(sym) if sym.eq_ignore_ascii_case(&snapshot.symbol) => {
                *self.latest.write() = Some(snapshot);
                self.version.fetch_add(1, Ordering::SeqCst);
                true
            }
            _ => {
                debug!(symbol = %snapshot.symbol, "dropping order book update for inactive symbol");
                false
            }
        }
    }

    /// The latest snapshot, if one has arrived since activation.
    pub fn latest(&self) -> Option<OrderBookSnapshot> {
        self.latest.read().clone()
    }

    /// Incremented on every accepted update and on activation changes.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

impl Default for OrderBookCache {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Depth WebSocket stream
// ---------------------------------------------------------------------------

/// Build the partial depth stream URL (`@depth20@100ms`) for `symbol`.
pub fn depth_stream_url(ws_base: &str, symbol: &str) -> String {
    let lower = symbol.to_lowercase();
    format!("{}/ws/{lower}@depth20@100ms", ws_base.trim_end_matches('/'))
}

/// Connect to the partial depth WebSocket stream for a single symbol and hand
/// every parsed snapshot to `on_update`.
///
/// Runs until the stream disconnects or an error occurs, then returns so that
/// the caller can handle reconnection.
pub async fn run_depth_stream<F>(ws_base: &str, symbol: &str, on_update: &mut F) -> Result<()>
where
    F: FnMut(OrderBookSnapshot),
{
    let url = depth_stream_url(ws_base, symbol);
    info!(url = %url, symbol = %symbol, "connecting to depth WebSocket");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to depth WebSocket")?;

    info!(symbol = %symbol, "depth WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_depth_message(symbol, &text) {
                        Ok(snapshot) => on_update(snapshot),
                        Err(e) => {
                            warn!(error = %e, "failed to parse depth message");
                        }
                    }
                }
            }
            Some(Err(e)) => {
                error!(symbol = %symbol, error = %e, "depth WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, "depth WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

/// Parse a partial-depth message into a snapshot for `symbol`.
///
/// Accepts the partial book shape:
/// ```json
/// { "lastUpdateId": 160, "bids": [["0.0024", "10"]], "asks": [["0.0026", "100"]] }
/// ```
/// and the diff-event shape (`"e": "depthUpdate"` with `b` / `a` / `u`).
pub fn parse_depth_message(symbol: &str, text: &str) -> Result<OrderBookSnapshot> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse depth JSON")?;

    // Combined-stream envelope.
    let data = if root.get("data").is_some() {
        &root["data"]
    } else {
        &root
    };

    let (bids_key, asks_key, id_key) = if data.get("e").and_then(|e| e.as_str()) == Some("depthUpdate") {
        ("b", "a", "u")
    } else {
        ("bids", "asks", "lastUpdateId")
    };

    let last_update_id = data[id_key]
        .as_u64()
        .with_context(|| format!("missing field {id_key}"))?;

    let bids = parse_levels(&data[bids_key], bids_key)?;
    let asks = parse_levels(&data[asks_key], asks_key)?;

    let symbol = data
        .get("s")
        .and_then(|s| s.as_str())
        .unwrap_or(symbol)
        .to_uppercase();

    Ok(OrderBookSnapshot {
        symbol,
        bids,
        asks,
        last_update_id,
        received_at: chrono::Utc::now().timestamp_millis(),
    })
}

fn parse_levels(val: &serde_json::Value, name: &str) -> Result<Vec<PriceLevel>> {
    let rows = val
        .as_array()
        .with_context(|| format!("missing field {name}"))?;

    rows.iter()
        .take(MAX_LEVELS)
        .map(|row| {
            let price = parse_string_f64(row.get(0).unwrap_or(&serde_json::Value::Null), "price")?;
            let quantity =
                parse_string_f64(row.get(1).unwrap_or(&serde_json::Value::Null), "quantity")?;
            Ok(PriceLevel { price, quantity })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(symbol: &str, id: u64) -> OrderBookSnapshot {
        OrderBookSnapshot {
            symbol: symbol.into(),
            bids: vec![PriceLevel { price: 99.0, quantity: 1.0 }],
            asks: vec![PriceLevel { price: 101.0, quantity: 2.0 }],
            last_update_id: id,
            received_at: 0,
        }
    }

    #[test]
    fn update_replaces_previous_snapshot() {
        let cache = OrderBookCache::new();
        cache.activate("BTCUSDT");
        assert!(cache.on_update(snapshot("BTCUSDT", 1)));
        assert!(cache.on_update(snapshot("BTCUSDT", 2)));
        assert_eq!(cache.latest().unwrap().last_update_id, 2);
    }

    #[test]
    fn updates_for_other_symbols_are_dropped() {
        let cache = OrderBookCache::new();
        cache.activate("ETHUSDT");
        let v = cache.version();
        assert!(!cache.on_update(snapshot("BTCUSDT", 7)));
        assert!(cache.latest().is_none());
        assert_eq!(cache.version(), v);
    }

    #[test]
    fn inactive_cache_accepts_nothing() {
        let cache = OrderBookCache::new();
        assert!(!cache.on_update(snapshot("BTCUSDT", 1)));
    }

    #[test]
    fn activate_discards_held_snapshot() {
        let cache = OrderBookCache::new();
        cache.activate("BTCUSDT");
        cache.on_update(snapshot("BTCUSDT", 1));
        cache.activate("ETHUSDT");
        assert!(cache.latest().is_none());
        assert_eq!(cache.active_symbol().as_deref(), Some("ETHUSDT"));
    }

    #[test]
    fn spread_bps_uses_first_levels() {
        let s = snapshot("BTCUSDT", 1);
        let bps = s.spread_bps().unwrap();
        assert!((bps - 200.0).abs() < 1e-9, "got {bps}");
    }

    #[test]
    fn parse_partial_depth_message() {
        let json = r#"{
            "lastUpdateId": 160,
            "bids": [["0.0024", "10"], ["0.0023", "5"]],
            "asks": [["0.0026", "100"]]
        }"#;
        let s = parse_depth_message("bnbbtc", json).expect("should parse");
        assert_eq!(s.symbol, "BNBBTC");
        assert_eq!(s.last_update_id, 160);
        assert_eq!(s.bids.len(), 2);
        assert!((s.bids[0].price - 0.0024).abs() < f64::EPSILON);
        assert!((s.asks[0].quantity - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_diff_event_message() {
        let json = r#"{
            "e": "depthUpdate", "E": 123456789, "s": "BNBUSDT", "U": 157, "u": 160,
            "b": [["0.0024", "10"]],
            "a": [["0.0025", "10"]]
        }"#;
        let s = parse_depth_message("ignored", json).expect("should parse");
        assert_eq!(s.symbol, "BNBUSDT");
        assert_eq!(s.last_update_id, 160);
        assert_eq!(s.asks.len(), 1);
    }

    #[test]
    fn parse_truncates_to_max_levels() {
        let levels: Vec<_> = (0..30).map(|i| serde_json::json!([format!("{i}"), "1"])).collect();
        let json = serde_json::json!({ "lastUpdateId": 1, "bids": levels, "asks": [] }).to_string();
        let s = parse_depth_message("BTCUSDT", &json).unwrap();
        assert_eq!(s.bids.len(), MAX_LEVELS);
        assert!(s.asks.is_empty());
    }

    #[test]
    fn parse_rejects_missing_fields() {
        assert!(parse_depth_message("BTCUSDT", r#"{"bids": []}"#).is_err());
        assert!(parse_depth_message("BTCUSDT", "not json").is_err());
    }

    #[test]
    fn depth_url_is_lowercase() {
        assert_eq!(
            depth_stream_url("wss://stream.binance.com:9443/", "BTCUSDT"),
            "wss://stream.binance.com:9443/ws/btcusdt@depth20@100ms"
        );
    }
}
