// =============================================================================
// Market Seasonality Explorer: Main Entry Point
// =============================================================================
//
// Loads the daily series for the configured symbol, keeps a live order book
// for it, and serves the calendar / indicator / order book views over HTTP
// and WebSocket.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod aggregation;
mod api;
mod app_state;
mod binance;
mod export;
mod indicators;
mod market_data;
mod runtime_config;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::binance::BinanceClient;
use crate::runtime_config::ExplorerConfig;

const CONFIG_PATH: &str = "explorer_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Market Seasonality Explorer starting up");

    let mut config = ExplorerConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        ExplorerConfig::default()
    });
    config.apply_env(|key| std::env::var(key).ok());

    info!(
        symbol = %config.symbol,
        interval = %config.interval,
        history_limit = config.history_limit,
        "Configured market"
    );

    // ── 2. Shared state ──────────────────────────────────────────────────
    let client = BinanceClient::new(config.rest_base_url.clone())?;
    let bind_addr = config.bind_addr.clone();
    let symbol = config.symbol.clone();
    let state = Arc::new(AppState::new(config, client));

    // ── 3. Initial data load + order book subscription ───────────────────
    app_state::select_symbol(&state, &symbol).await;
    info!(symbol = %symbol, candles = state.candle_count(), "Initial market data ready");

    // ── 4. API server ────────────────────────────────────────────────────
    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        warn!("Shutdown signal received, stopping gracefully");
    });

    if let Err(e) = server.await {
        error!(error = %e, "API server failed");
    }

    // ── 5. Teardown ──────────────────────────────────────────────────────
    state.release_order_book();

    if let Err(e) = state.config.read().save(CONFIG_PATH) {
        error!(error = %e, "Failed to save config on shutdown");
    }

    info!("Market Seasonality Explorer shut down complete.");
    Ok(())
}
