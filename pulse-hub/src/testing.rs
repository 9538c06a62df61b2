//! Test doubles shared by the hub's unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_core::types::Symbol;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::feed::{FeedError, FeedHandle, UpstreamFeed};

/// Feed that counts live subscriptions per symbol.
#[derive(Debug, Default)]
pub struct CountingFeed {
    next_id: AtomicU64,
    subscribe_calls: AtomicUsize,
    active: Mutex<HashMap<FeedHandle, Symbol>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl CountingFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call yields to the scheduler for `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Makes `subscribe` fail for `symbol`.
    pub fn fail_on(&self, symbol: &str) {
        self.failing.lock().insert(symbol.to_string());
    }

    /// Live upstream subscriptions for `symbol`.
    pub fn active_for(&self, symbol: &str) -> usize {
        self.active
            .lock()
            .values()
            .filter(|s| s.as_str() == symbol)
            .count()
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
    }
}

#[async_trait]
impl UpstreamFeed for CountingFeed {
    async fn subscribe(&self, symbol: &Symbol) -> Result<FeedHandle, FeedError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.failing.lock().contains(symbol.as_str()) {
            return Err(FeedError::Unavailable(format!("{symbol} rejected")));
        }
        let handle = FeedHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.active.lock().insert(handle, symbol.clone());
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: FeedHandle) -> Result<(), FeedError> {
        self.pause().await;
        self.active
            .lock()
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| FeedError::Unavailable(format!("unknown handle {}", handle.id())))
    }
}
