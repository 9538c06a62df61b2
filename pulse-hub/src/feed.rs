//! Upstream market-data feed collaborator.
//!
//! The hub opens at most one feed subscription per symbol and hands the
//! returned [`FeedHandle`] back when the last interested connection leaves.
//! Updates produced by the feed reach the hub as [`QuoteUpdate`]s on an mpsc
//! channel passed to [`Hub::start`](crate::Hub::start).

use async_trait::async_trait;
use pulse_core::types::{Price, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque token for one upstream subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedHandle(u64);

impl FeedHandle {
    /// Creates a handle. Feed implementations pick the id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the id chosen by the feed.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.0
    }
}

/// Feed failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// The feed does not know the symbol
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// The feed cannot serve requests right now
    #[error("feed unavailable: {0}")]
    Unavailable(String),
}

/// Upstream market-data source.
#[async_trait]
pub trait UpstreamFeed: Send + Sync {
    /// Starts producing updates for `symbol`.
    async fn subscribe(&self, symbol: &Symbol) -> Result<FeedHandle, FeedError>;

    /// Stops the subscription identified by `handle`.
    async fn unsubscribe(&self, handle: FeedHandle) -> Result<(), FeedError>;
}

/// One quote produced by the upstream feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteUpdate {
    /// Instrument
    pub symbol: Symbol,
    /// Last traded price
    pub price: Price,
    /// Absolute change from the previous close
    pub change: Decimal,
    /// Percentage change from the previous close
    pub change_percent: Decimal,
    /// Traded volume
    pub volume: u64,
    /// Quote time in milliseconds since the epoch
    pub timestamp: i64,
}

impl QuoteUpdate {
    /// Store key under which the latest quote for `symbol` is kept.
    #[must_use]
    pub fn store_key(symbol: &Symbol) -> String {
        format!("quote:{symbol}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_wire_shape() {
        let quote = QuoteUpdate {
            symbol: Symbol::new("aapl").unwrap(),
            price: Price::new(dec!(189.5)).unwrap(),
            change: dec!(1.25),
            change_percent: dec!(0.66),
            volume: 1200,
            timestamp: 1_700_000_000_000,
        };

        let value = serde_json::to_value(&quote).unwrap();
        assert_eq!(value["symbol"], "AAPL");
        assert_eq!(value["changePercent"], "0.66");
        assert_eq!(value["volume"], 1200);

        let parsed: QuoteUpdate = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, quote);
    }

    #[test]
    fn test_store_key() {
        let symbol = Symbol::new("0700").unwrap();
        assert_eq!(QuoteUpdate::store_key(&symbol), "quote:0700.HK");
    }
}
