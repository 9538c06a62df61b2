//! Simulated upstream feed.
//!
//! Each subscription owns one ticker task that walks a price around a
//! per-symbol base and pushes a [`QuoteUpdate`] every interval. The task is
//! aborted when its handle is unsubscribed.

use async_trait::async_trait;
use dashmap::DashMap;
use pulse_core::types::{Price, Symbol};
use pulse_hub::feed::{FeedError, FeedHandle, QuoteUpdate, UpstreamFeed};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::FeedConfig;

/// Smallest price the walk may reach.
const MIN_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Feed that fabricates quotes on a timer.
pub struct SimulatedFeed {
    config: FeedConfig,
    quotes: mpsc::Sender<QuoteUpdate>,
    tickers: DashMap<u64, JoinHandle<()>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for SimulatedFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedFeed")
            .field("config", &self.config)
            .field("active", &self.tickers.len())
            .finish_non_exhaustive()
    }
}

impl SimulatedFeed {
    /// Creates the feed and the receiver the hub pumps quotes from.
    #[must_use]
    pub fn new(config: FeedConfig) -> (Arc<Self>, mpsc::Receiver<QuoteUpdate>) {
        let (quotes, rx) = mpsc::channel(config.buffer_size.max(1));
        let feed = Arc::new(Self {
            config,
            quotes,
            tickers: DashMap::new(),
            next_id: AtomicU64::new(1),
        });
        (feed, rx)
    }

    /// Number of running ticker tasks.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tickers.len()
    }

    /// Aborts every ticker.
    pub fn stop_all(&self) {
        let ids: Vec<u64> = self.tickers.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, task)) = self.tickers.remove(&id) {
                task.abort();
            }
        }
    }
}

impl Drop for SimulatedFeed {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[async_trait]
impl UpstreamFeed for SimulatedFeed {
    async fn subscribe(&self, symbol: &Symbol) -> Result<FeedHandle, FeedError> {
        if self.quotes.is_closed() {
            return Err(FeedError::Unavailable("quote channel closed".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let walk = PriceWalk::new(symbol.clone(), self.config.volatility_bps, id);
        let task = tokio::spawn(run_ticker(walk, self.config.interval(), self.quotes.clone()));
        self.tickers.insert(id, task);

        info!(symbol = %symbol, handle = id, "Simulated ticker started");
        Ok(FeedHandle::new(id))
    }

    async fn unsubscribe(&self, handle: FeedHandle) -> Result<(), FeedError> {
        match self.tickers.remove(&handle.id()) {
            Some((_, task)) => {
                task.abort();
                info!(handle = handle.id(), "Simulated ticker stopped");
            }
            None => debug!(handle = handle.id(), "Unsubscribe for unknown handle"),
        }
        Ok(())
    }
}

async fn run_ticker(mut walk: PriceWalk, period: Duration, quotes: mpsc::Sender<QuoteUpdate>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if quotes.send(walk.next_quote()).await.is_err() {
            debug!(symbol = %walk.symbol, "Quote channel closed, ticker exiting");
            break;
        }
    }
}

/// Random walk for one symbol.
#[derive(Debug)]
struct PriceWalk {
    symbol: Symbol,
    previous_close: Price,
    last: Price,
    volume: u64,
    volatility_bps: i64,
    rng: StdRng,
}

impl PriceWalk {
    fn new(symbol: Symbol, volatility_bps: u32, seed: u64) -> Self {
        let base = base_price(&symbol);
        Self {
            symbol,
            previous_close: base,
            last: base,
            volume: 0,
            volatility_bps: i64::from(volatility_bps),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn next_quote(&mut self) -> QuoteUpdate {
        let bps = if self.volatility_bps == 0 {
            0
        } else {
            self.rng.gen_range(-self.volatility_bps..=self.volatility_bps)
        };
        let current = self.last.as_decimal();
        let moved = (current + current * Decimal::new(bps, 4)).round_dp(2).max(MIN_PRICE);
        self.last = Price::new(moved).unwrap_or(self.last);
        self.volume += self.rng.gen_range(100..10_000);

        QuoteUpdate {
            symbol: self.symbol.clone(),
            price: self.last,
            change: self.last.change_from(self.previous_close),
            change_percent: self.last.change_percent_from(self.previous_close),
            volume: self.volume,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Stable starting price between 10 and 500 derived from the ticker.
fn base_price(symbol: &Symbol) -> Price {
    let sum: u32 = symbol.as_str().bytes().map(u32::from).sum();
    Price::new(Decimal::from(10 + sum % 490)).unwrap_or(Price::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> FeedConfig {
        FeedConfig {
            interval_ms: 10,
            ..FeedConfig::default()
        }
    }

    #[tokio::test]
    async fn test_subscribe_emits_quotes() {
        let (feed, mut rx) = SimulatedFeed::new(fast_config());
        let symbol = Symbol::new("AAPL").unwrap();

        let handle = feed.subscribe(&symbol).await.unwrap();
        assert_eq!(feed.active_count(), 1);

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.symbol, symbol);
        assert!(first.price > Price::ZERO);

        feed.unsubscribe(handle).await.unwrap();
        assert_eq!(feed.active_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_ticker() {
        let (feed, mut rx) = SimulatedFeed::new(fast_config());
        let handle = feed.subscribe(&Symbol::new("TSLA").unwrap()).await.unwrap();
        rx.recv().await.unwrap();

        feed.unsubscribe(handle).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        while rx.try_recv().is_ok() {}

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handles_are_independent() {
        let (feed, _rx) = SimulatedFeed::new(fast_config());
        let a = feed.subscribe(&Symbol::new("AAPL").unwrap()).await.unwrap();
        let b = feed.subscribe(&Symbol::new("0700").unwrap()).await.unwrap();
        assert_ne!(a, b);

        feed.unsubscribe(a).await.unwrap();
        assert_eq!(feed.active_count(), 1);
        // Unknown handles are ignored.
        feed.unsubscribe(a).await.unwrap();
        assert_eq!(feed.active_count(), 1);

        feed.stop_all();
        assert_eq!(feed.active_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_channel_is_unavailable() {
        let (feed, rx) = SimulatedFeed::new(fast_config());
        drop(rx);
        let result = feed.subscribe(&Symbol::new("AAPL").unwrap()).await;
        assert!(matches!(result, Err(FeedError::Unavailable(_))));
    }

    #[test]
    fn test_walk_stays_within_volatility() {
        let mut walk = PriceWalk::new(Symbol::new("MSFT").unwrap(), 50, 7);
        let base = walk.last.as_decimal();

        let quote = walk.next_quote();
        let bound = (base * Decimal::new(50, 4)).round_dp(2) + Decimal::new(1, 2);
        assert!((quote.price.as_decimal() - base).abs() <= bound);
        assert_eq!(quote.change, quote.price.change_from(Price::new(base).unwrap()));
        assert!(quote.volume >= 100);
    }

    #[test]
    fn test_base_price_is_stable() {
        let symbol = Symbol::new("AAPL").unwrap();
        assert_eq!(base_price(&symbol), base_price(&symbol));
        assert!(base_price(&symbol) >= Price::new(Decimal::from(10)).unwrap());
    }
}
