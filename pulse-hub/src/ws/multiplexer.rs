//! Symbol subscription multiplexer.
//!
//! Many connections may want the same symbol; the upstream feed sees exactly
//! one subscription per symbol, opened with the first subscriber and released
//! with the last.
//!
//! Each symbol has a slot guarded by an async mutex, so upstream calls for one
//! symbol are serialized while different symbols proceed independently. A slot
//! that has been emptied is marked retired before it leaves the map; a waiter
//! that wakes up on a retired slot starts over with a fresh one. Together this
//! keeps "upstream handle present" and "subscriber set non-empty" equal
//! whenever no slot lock is held.
//!
//! Work under a slot lock runs on a task owned by the multiplexer. Callers
//! await its result, but dropping the caller (a socket closing mid-dispatch)
//! never abandons a feed call halfway.
//!
//! The per-connection interest map is the source of truth for what a
//! connection holds. Removing a connection drops its interest entry first, so
//! an in-flight subscribe for that connection observes the removal and backs
//! out instead of leaving a dangling subscriber.

use async_trait::async_trait;
use dashmap::DashMap;
use pulse_core::types::Symbol;
use pulse_telemetry::metrics::PulseMetrics;
use pulse_telemetry::spans::upstream_span;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use super::connection::{ConnectionId, ConnectionObserver};
use super::message::AckError;
use crate::error::SubscriptionError;
use crate::feed::{FeedHandle, UpstreamFeed};

#[derive(Debug, Default)]
struct SymbolSlot {
    subscribers: HashSet<ConnectionId>,
    handle: Option<FeedHandle>,
    retired: bool,
}

/// Outcome of a batch subscribe or unsubscribe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionOutcome {
    /// Symbols the request succeeded for, normalized
    pub symbols: Vec<Symbol>,
    /// Per-symbol failures keyed by the symbol as requested
    pub errors: Vec<(String, SubscriptionError)>,
}

impl SubscriptionOutcome {
    /// Normalized symbol names.
    #[must_use]
    pub fn symbol_names(&self) -> Vec<String> {
        self.symbols.iter().map(ToString::to_string).collect()
    }

    /// Failures in ack form.
    #[must_use]
    pub fn ack_errors(&self) -> Vec<AckError> {
        self.errors
            .iter()
            .map(|(symbol, error)| AckError {
                symbol: symbol.clone(),
                error: error.reason().to_string(),
            })
            .collect()
    }
}

/// Maps symbols to interested connections over a single upstream feed.
pub struct SymbolMultiplexer {
    state: Arc<MuxState>,
}

struct MuxState {
    feed: Arc<dyn UpstreamFeed>,
    slots: DashMap<Symbol, Arc<Mutex<SymbolSlot>>>,
    interests: DashMap<ConnectionId, HashSet<Symbol>>,
    upstream: AtomicUsize,
    max_symbols: usize,
}

impl std::fmt::Debug for SymbolMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolMultiplexer")
            .field("slots", &self.state.slots.len())
            .field("connections", &self.state.interests.len())
            .field("upstream", &self.state.upstream.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SymbolMultiplexer {
    /// Creates a multiplexer over `feed`.
    #[must_use]
    pub fn new(feed: Arc<dyn UpstreamFeed>, max_symbols_per_connection: usize) -> Self {
        Self {
            state: Arc::new(MuxState {
                feed,
                slots: DashMap::new(),
                interests: DashMap::new(),
                upstream: AtomicUsize::new(0),
                max_symbols: max_symbols_per_connection,
            }),
        }
    }

    /// Starts tracking a connection. Subscribes for unknown connections are
    /// reported as cancelled.
    pub fn attach(&self, conn: ConnectionId) {
        self.state.interests.entry(conn).or_default();
    }

    /// Subscribes `conn` to each symbol in `requested`.
    ///
    /// Partial success is normal: every symbol either lands in `symbols` or in
    /// `errors`. Duplicates within one request are collapsed.
    pub async fn subscribe(&self, conn: ConnectionId, requested: &[String]) -> SubscriptionOutcome {
        let mut outcome = SubscriptionOutcome::default();
        let mut seen = HashSet::new();

        for raw in requested {
            let Ok(symbol) = Symbol::new(raw) else {
                outcome
                    .errors
                    .push((raw.clone(), SubscriptionError::InvalidSymbol(raw.clone())));
                continue;
            };
            if !seen.insert(symbol.clone()) {
                continue;
            }
            let state = Arc::clone(&self.state);
            let target = symbol.clone();
            let task = tokio::spawn(
                async move { state.subscribe_one(conn, &target).await }.in_current_span(),
            );
            let result = task.await.unwrap_or_else(|e| {
                error!(conn_id = %conn, symbol = %symbol, error = %e, "Subscribe task failed");
                Err(SubscriptionError::Cancelled)
            });
            match result {
                Ok(()) => outcome.symbols.push(symbol),
                Err(e) => {
                    debug!(conn_id = %conn, symbol = %symbol, error = %e, "Subscribe failed");
                    outcome.errors.push((symbol.to_string(), e));
                }
            }
        }
        outcome
    }

    /// Unsubscribes `conn` from each symbol in `requested`.
    ///
    /// Symbols the connection never held are reported as unsubscribed.
    pub async fn unsubscribe(
        &self,
        conn: ConnectionId,
        requested: &[String],
    ) -> SubscriptionOutcome {
        let mut outcome = SubscriptionOutcome::default();
        let mut seen = HashSet::new();

        for raw in requested {
            let Ok(symbol) = Symbol::new(raw) else {
                outcome
                    .errors
                    .push((raw.clone(), SubscriptionError::InvalidSymbol(raw.clone())));
                continue;
            };
            if !seen.insert(symbol.clone()) {
                continue;
            }
            let held = self
                .state
                .interests
                .get_mut(&conn)
                .is_some_and(|mut symbols| symbols.remove(&symbol));
            if held {
                join_detach(self.state.spawn_detach(conn, symbol.clone())).await;
            }
            outcome.symbols.push(symbol);
        }
        outcome
    }

    /// Drops every symbol held by `conn`, tearing down upstream subscriptions
    /// that lose their last subscriber.
    pub async fn on_connection_removed(&self, conn: ConnectionId) {
        let Some((_, symbols)) = self.state.interests.remove(&conn) else {
            return;
        };
        // Every detach is spawned before the first await.
        let tasks: Vec<_> = symbols
            .iter()
            .map(|symbol| self.state.spawn_detach(conn, symbol.clone()))
            .collect();
        for task in tasks {
            join_detach(task).await;
        }
        if !symbols.is_empty() {
            debug!(conn_id = %conn, count = symbols.len(), "Released symbols of removed connection");
        }
    }

    /// Symbols held by `conn`, sorted.
    #[must_use]
    pub fn symbols_of(&self, conn: ConnectionId) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self
            .state
            .interests
            .get(&conn)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        symbols.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        symbols
    }

    /// Current subscribers of `symbol`.
    ///
    /// Waits for in-flight upstream work on the symbol to settle.
    pub async fn subscribers(&self, symbol: &Symbol) -> Vec<ConnectionId> {
        match self.state.existing_slot(symbol).await {
            Some(slot) => slot.subscribers.iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Returns true if an upstream subscription for `symbol` is open.
    pub async fn has_upstream(&self, symbol: &Symbol) -> bool {
        match self.state.existing_slot(symbol).await {
            Some(slot) => slot.handle.is_some(),
            None => false,
        }
    }

    /// Number of open upstream subscriptions.
    #[must_use]
    pub fn upstream_count(&self) -> usize {
        self.state.upstream.load(Ordering::Acquire)
    }

    /// Number of tracked connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.state.interests.len()
    }
}

async fn join_detach(task: JoinHandle<()>) {
    if let Err(e) = task.await {
        error!(error = %e, "Detach task failed");
    }
}

impl MuxState {
    async fn subscribe_one(
        &self,
        conn: ConnectionId,
        symbol: &Symbol,
    ) -> Result<(), SubscriptionError> {
        // Fast path that skips the slot lock for repeats and full connections.
        match self.interests.get(&conn) {
            None => return Err(SubscriptionError::Cancelled),
            Some(held) if held.contains(symbol) => return Ok(()),
            Some(held) if held.len() >= self.max_symbols => {
                return Err(SubscriptionError::LimitExceeded {
                    limit: self.max_symbols,
                });
            }
            Some(_) => {}
        }

        let mut slot = self.lock_slot(symbol).await;

        if slot.handle.is_none() {
            let opened = self
                .feed
                .subscribe(symbol)
                .instrument(upstream_span(symbol.as_str(), "subscribe"))
                .await;
            match opened {
                Ok(handle) => {
                    slot.handle = Some(handle);
                    self.upstream.fetch_add(1, Ordering::AcqRel);
                    PulseMetrics::upstream_opened();
                    info!(symbol = %symbol, handle = handle.id(), "Upstream subscription opened");
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Upstream subscribe failed");
                    self.release_if_idle(symbol, &mut slot).await;
                    return Err(e.into());
                }
            }
        }

        if let Err(e) = self.record_interest(conn, symbol) {
            self.release_if_idle(symbol, &mut slot).await;
            return Err(e);
        }
        slot.subscribers.insert(conn);
        Ok(())
    }

    fn record_interest(&self, conn: ConnectionId, symbol: &Symbol) -> Result<(), SubscriptionError> {
        let mut held = self
            .interests
            .get_mut(&conn)
            .ok_or(SubscriptionError::Cancelled)?;
        if held.contains(symbol) {
            return Ok(());
        }
        if held.len() >= self.max_symbols {
            return Err(SubscriptionError::LimitExceeded {
                limit: self.max_symbols,
            });
        }
        held.insert(symbol.clone());
        Ok(())
    }

    fn spawn_detach(self: &Arc<Self>, conn: ConnectionId, symbol: Symbol) -> JoinHandle<()> {
        let state = Arc::clone(self);
        tokio::spawn(async move { state.detach(conn, &symbol).await }.in_current_span())
    }

    async fn detach(&self, conn: ConnectionId, symbol: &Symbol) {
        let Some(mut slot) = self.existing_slot(symbol).await else {
            return;
        };
        // The connection subscribed again while we waited for the slot.
        if self
            .interests
            .get(&conn)
            .is_some_and(|held| held.contains(symbol))
        {
            return;
        }
        slot.subscribers.remove(&conn);
        self.release_if_idle(symbol, &mut slot).await;
    }

    async fn release_if_idle(&self, symbol: &Symbol, slot: &mut OwnedMutexGuard<SymbolSlot>) {
        if !slot.subscribers.is_empty() {
            return;
        }

        if let Some(handle) = slot.handle.take() {
            let closed = self
                .feed
                .unsubscribe(handle)
                .instrument(upstream_span(symbol.as_str(), "unsubscribe"))
                .await;
            if let Err(e) = closed {
                warn!(symbol = %symbol, error = %e, "Upstream unsubscribe failed, dropping handle");
            }
            self.upstream.fetch_sub(1, Ordering::AcqRel);
            PulseMetrics::upstream_closed();
            info!(symbol = %symbol, "Upstream subscription closed");
        }

        slot.retired = true;
        let current = Arc::clone(OwnedMutexGuard::mutex(slot));
        self.slots
            .remove_if(symbol, |_, entry| Arc::ptr_eq(entry, &current));
    }

    async fn lock_slot(&self, symbol: &Symbol) -> OwnedMutexGuard<SymbolSlot> {
        loop {
            let slot = self.slots.entry(symbol.clone()).or_default().value().clone();
            let guard = slot.lock_owned().await;
            if !guard.retired {
                return guard;
            }
        }
    }

    async fn existing_slot(&self, symbol: &Symbol) -> Option<OwnedMutexGuard<SymbolSlot>> {
        loop {
            let slot = self.slots.get(symbol).map(|entry| entry.value().clone())?;
            let guard = slot.lock_owned().await;
            if !guard.retired {
                return Some(guard);
            }
        }
    }
}

#[async_trait]
impl ConnectionObserver for SymbolMultiplexer {
    fn on_admitted(&self, id: ConnectionId) {
        self.attach(id);
    }

    async fn on_removed(&self, id: ConnectionId) {
        self.on_connection_removed(id).await;
    }
}
