pub mod candle;
pub mod orderbook;
pub mod subscription;

// Re-export the core types for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle::Candle;
pub use orderbook::{OrderBookCache, OrderBookSnapshot};
pub use subscription::OrderBookFeed;
