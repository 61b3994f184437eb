// =============================================================================
// Order Book Subscription: owned handle to a live depth stream
// =============================================================================
//
// A subscription owns the task that drives the depth stream. Releasing it
// (explicitly or by dropping it) aborts the task. `OrderBookFeed` keeps at
// most one subscription alive and always releases the previous one before
// starting the next.
// =============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use super::orderbook::{run_depth_stream, OrderBookCache, OrderBookSnapshot};

/// Back-off between reconnect attempts of a live subscription.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Handle to one live order-book stream.
pub struct OrderBookSubscription {
    symbol: String,
    task: Option<JoinHandle<()>>,
}

impl OrderBookSubscription {
    /// Wrap an already-spawned stream task.
    pub fn from_task(symbol: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self {
            symbol: symbol.into(),
            task: Some(task),
        }
    }

    /// Spawn `fut` as the stream task for `symbol`.
    pub fn spawn<Fut>(symbol: impl Into<String>, fut: Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::from_task(symbol, tokio::spawn(fut))
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// `true` until released or until the stream task exits on its own.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the stream. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!(symbol = %self.symbol, "order book subscription released");
        }
    }
}

impl Drop for OrderBookSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for OrderBookSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBookSubscription")
            .field("symbol", &self.symbol)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Subscribe to the depth stream of `symbol`, delivering every snapshot to
/// `on_update`. The stream reconnects after [`RECONNECT_DELAY`] until the
/// returned handle is released.
///
/// Snapshots are delivered one at a time from a single task.
pub fn subscribe_order_book<F>(ws_base: &str, symbol: &str, mut on_update: F) -> OrderBookSubscription
where
    F: FnMut(OrderBookSnapshot) + Send + 'static,
{
    let ws_base = ws_base.to_string();
    let sym = symbol.to_uppercase();
    let task_sym = sym.clone();

    OrderBookSubscription::spawn(sym, async move {
        loop {
            if let Err(e) = run_depth_stream(&ws_base, &task_sym, &mut on_update).await {
                error!(symbol = %task_sym, error = %e, "Depth stream error, reconnecting in 5s");
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    })
}

// ---------------------------------------------------------------------------
// OrderBookFeed
// ---------------------------------------------------------------------------

/// Owns the single live subscription feeding an [`OrderBookCache`].
pub struct OrderBookFeed {
    ws_base: String,
    cache: Arc<OrderBookCache>,
    current: Option<OrderBookSubscription>,
}

impl OrderBookFeed {
    pub fn new(ws_base: impl Into<String>, cache: Arc<OrderBookCache>) -> Self {
        Self {
            ws_base: ws_base.into(),
            cache,
            current: None,
        }
    }

    /// Symbol of the live subscription, if any.
    pub fn current_symbol(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.symbol())
    }

    /// Switch the live stream to `symbol` using the exchange depth stream.
    pub fn switch_to(&mut self, symbol: &str) {
        let ws_base = self.ws_base.clone();
        self.switch_with(symbol, move |sym, cache| {
            subscribe_order_book(&ws_base, sym, move |snapshot| {
                cache.on_update(snapshot);
            })
        });
    }

    /// Release the current subscription, activate `symbol` on the cache, then
    /// establish a new subscription via `subscribe`.
    pub fn switch_with<S>(&mut self, symbol: &str, subscribe: S)
    where
        S: FnOnce(&str, Arc<OrderBookCache>) -> OrderBookSubscription,
    {
        let symbol = symbol.to_uppercase();
        self.release();
        self.cache.activate(&symbol);
        self.current = Some(subscribe(&symbol, self.cache.clone()));
        info!(symbol = %symbol, "order book feed switched");
    }

    /// Release the live subscription and clear the cache. Idempotent.
    pub fn release(&mut self) {
        if let Some(mut sub) = self.current.take() {
            sub.unsubscribe();
            self.cache.deactivate();
        }
    }
}

impl Drop for OrderBookFeed {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
