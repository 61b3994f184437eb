// =============================================================================
// Central Application State
// =============================================================================
//
// Ties the market data source, the aggregated calendar view, the indicator
// panel and the order book feed together for the REST API and WebSocket push.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot locks for all mutable shared state; no lock is held across
//     an `.await`.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregation::calendar::{annotate, filter_month, CalendarCell, MonthCursor, RangeSelection};
use crate::aggregation::{group_by_period, period_bounds, AggregatedBucket};
use crate::binance::{BinanceClient, MarketDataSource};
use crate::indicators::IndicatorSnapshot;
use crate::market_data::candle::sort_by_time;
use crate::market_data::{Candle, OrderBookCache, OrderBookFeed, OrderBookSnapshot};
use crate::runtime_config::ExplorerConfig;
use crate::types::Timeframe;

/// Interval of the series the indicator panel is computed from.
const INDICATOR_INTERVAL: &str = "1d";

/// Levels per side pushed to clients.
pub const ORDER_BOOK_DISPLAY_DEPTH: usize = 10;

/// Which symbol is selected, and which load generation belongs to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub symbol: String,
    pub generation: u64,
}

/// Payload for the indicator panel.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorView {
    pub symbol: String,
    pub indicators: Option<IndicatorSnapshot>,
}

/// Everything shown for one selected calendar cell.
#[derive(Debug, Clone, Serialize)]
pub struct DetailView {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub cell: CalendarCell,
    pub indicators: Option<IndicatorSnapshot>,
    pub order_book: OrderBookView,
}

/// Payload pushed over the WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct OrderBookView {
    pub state_version: u64,
    pub symbol: Option<String>,
    pub spread_bps: Option<f64>,
    pub order_book: Option<OrderBookSnapshot>,
}

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Incremented on every meaningful mutation; the WebSocket feed polls it.
    pub state_version: AtomicU64,

    pub config: Arc<RwLock<ExplorerConfig>>,
    pub client: BinanceClient,

    selection: RwLock<Selection>,
    history: RwLock<Vec<Candle>>,
    indicators: RwLock<Option<IndicatorSnapshot>>,
    pub range: RwLock<RangeSelection>,

    pub order_book: Arc<OrderBookCache>,
    feed: Mutex<OrderBookFeed>,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: ExplorerConfig, client: BinanceClient) -> Self {
        let order_book = Arc::new(OrderBookCache::new());
        let feed = OrderBookFeed::new(config.ws_base_url.clone(), order_book.clone());
        let selection = Selection {
            symbol: config.symbol.to_uppercase(),
            generation: 0,
        };

        Self {
            state_version: AtomicU64::new(1),
            config: Arc::new(RwLock::new(config)),
            client,
            selection: RwLock::new(selection),
            history: RwLock::new(Vec::new()),
            indicators: RwLock::new(None),
            range: RwLock::new(RangeSelection::default()),
            order_book,
            feed: Mutex::new(feed),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    /// Combined version of the app state and the order book cache.
    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst) + self.order_book.version()
    }

    // ── Selection ───────────────────────────────────────────────────────

    pub fn selection(&self) -> Selection {
        self.selection.read().clone()
    }

    /// Symbol of the live order book subscription, if any.
    pub fn streaming_symbol(&self) -> Option<String> {
        self.feed.lock().current_symbol().map(str::to_string)
    }

    /// Select `symbol`, start a new load generation and move the order book
    /// stream to it. Data loaded for any earlier generation is discarded from
    /// here on. The symbol is also written to the config so it is persisted
    /// on shutdown.
    pub fn begin_selection(&self, symbol: &str) -> u64 {
        self.begin_selection_with(symbol, |feed, sym| feed.switch_to(sym))
    }

    /// Like [`AppState::begin_selection`], with the feed switch supplied by
    /// the caller. The feed lock is held for the whole step, so concurrent
    /// selections cannot leave the stream on a different symbol than the
    /// selection.
    fn begin_selection_with<F>(&self, symbol: &str, switch: F) -> u64
    where
        F: FnOnce(&mut OrderBookFeed, &str),
    {
        let symbol = symbol.to_uppercase();
        let mut feed = self.feed.lock();

        let generation = {
            let mut sel = self.selection.write();
            sel.symbol = symbol.clone();
            sel.generation += 1;
            sel.generation
        };
        self.config.write().symbol = symbol.clone();
        self.history.write().clear();
        *self.indicators.write() = None;
        self.range.write().clear();

        switch(&mut feed, &symbol);
        drop(feed);

        self.increment_version();
        info!(symbol = %symbol, generation, "symbol selected");
        generation
    }

    /// Selection whose order book stream never connects.
    #[cfg(test)]
    pub(crate) fn select_offline(&self, symbol: &str) -> u64 {
        self.begin_selection_with(symbol, |feed, sym| {
            feed.switch_with(sym, |s, _| {
                crate::market_data::subscription::OrderBookSubscription::spawn(
                    s,
                    std::future::pending::<()>(),
                )
            })
        })
    }

    fn is_current(&self, generation: u64) -> bool {
        self.selection.read().generation == generation
    }

    /// Store a freshly fetched series, oldest candle first. Returns `false`
    /// (and drops it) when a newer selection has started since `generation`
    /// was issued.
    pub fn apply_history(&self, generation: u64, mut candles: Vec<Candle>) -> bool {
        if !self.is_current(generation) {
            warn!(generation, "discarding stale history response");
            return false;
        }
        sort_by_time(&mut candles);
        *self.history.write() = candles;
        self.increment_version();
        true
    }

    pub fn apply_indicators(&self, generation: u64, snapshot: IndicatorSnapshot) -> bool {
        if !self.is_current(generation) {
            warn!(generation, "discarding stale indicator response");
            return false;
        }
        *self.indicators.write() = Some(snapshot);
        self.increment_version();
        true
    }

    // ── Views ───────────────────────────────────────────────────────────

    pub fn candle_count(&self) -> usize {
        self.history.read().len()
    }

    pub fn buckets(&self, timeframe: Timeframe) -> Vec<AggregatedBucket> {
        group_by_period(&self.history.read(), timeframe)
    }

    /// Annotated cells for `timeframe`, optionally limited to one month.
    pub fn calendar(&self, timeframe: Timeframe, month: Option<MonthCursor>) -> Vec<CalendarCell> {
        let buckets = self.buckets(timeframe);
        let buckets = match month {
            Some(m) => filter_month(&buckets, m),
            None => buckets,
        };
        let thresholds = self.config.read().cell_thresholds();
        let range = *self.range.read();
        annotate(&buckets, &thresholds, &range)
    }

    /// Detail for the `timeframe` bucket containing `time_ms`, or `None` when
    /// no loaded candle falls in that period.
    pub fn detail(&self, time_ms: i64, timeframe: Timeframe) -> Option<DetailView> {
        let (start, _) = period_bounds(time_ms, timeframe)?;
        let bucket = self
            .buckets(timeframe)
            .into_iter()
            .find(|b| b.period_start == start)?;

        let thresholds = self.config.read().cell_thresholds();
        let range = *self.range.read();
        let cell = annotate(std::slice::from_ref(&bucket), &thresholds, &range).pop()?;

        let IndicatorView { symbol, indicators } = self.indicator_view();
        Some(DetailView {
            symbol,
            timeframe,
            cell,
            indicators,
            order_book: self.order_book_view(),
        })
    }

    pub fn indicator_view(&self) -> IndicatorView {
        IndicatorView {
            symbol: self.selection.read().symbol.clone(),
            indicators: self.indicators.read().clone(),
        }
    }

    pub fn order_book_view(&self) -> OrderBookView {
        let latest = self.order_book.latest();
        OrderBookView {
            state_version: self.current_state_version(),
            symbol: self.order_book.active_symbol(),
            spread_bps: latest.as_ref().and_then(|s| s.spread_bps()),
            order_book: latest.map(|s| s.top(ORDER_BOOK_DISPLAY_DEPTH)),
        }
    }

    // ── Order book feed ─────────────────────────────────────────────────

    /// Release the depth subscription. Idempotent.
    pub fn release_order_book(&self) {
        self.feed.lock().release();
        self.increment_version();
    }
}

/// Fetch the calendar series and the indicator closes for `generation` and
/// store whatever is still current when the responses arrive.
pub async fn load_market_data<S: MarketDataSource>(state: &AppState, source: &S, generation: u64) {
    let (symbol, interval, history_limit, indicator_limit, periods) = {
        let config = state.config.read();
        (
            state.selection.read().symbol.clone(),
            config.interval.clone(),
            config.history_limit,
            config.indicator_limit,
            config.indicator_periods(),
        )
    };

    let (history, daily) = tokio::join!(
        source.fetch_series(&symbol, &interval, history_limit),
        source.fetch_series(&symbol, INDICATOR_INTERVAL, indicator_limit),
    );

    let count = history.len();
    if state.apply_history(generation, history) {
        info!(symbol = %symbol, candles = count, "history loaded");
    }

    let closes: Vec<f64> = daily.iter().map(|c| c.close).collect();
    let snapshot = IndicatorSnapshot::compute(&closes, periods);
    if state.apply_indicators(generation, snapshot) {
        info!(symbol = %symbol, observations = closes.len(), "indicators computed");
    }
}

/// Select `symbol`: new generation and order book switch, then data load.
pub async fn select_symbol(state: &Arc<AppState>, symbol: &str) {
    let generation = state.begin_selection(symbol);
    load_market_data(state, &state.client, generation).await;
}
