pub mod client;

use std::future::Future;

use crate::market_data::Candle;

pub use client::BinanceClient;

/// Source of historical candle series.
///
/// Implementations never fail: transport errors are logged at the boundary
/// and reduce to an empty series.
pub trait MarketDataSource: Send + Sync {
    fn fetch_series(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> impl Future<Output = Vec<Candle>> + Send;
}
