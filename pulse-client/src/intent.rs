//! Durable subscription intents.
//!
//! Intents outlive any single connection. A disconnect never removes one;
//! only an explicit unsubscribe does. Intents are keyed by the normalized
//! [`Symbol`], the same form the hub uses, so `aapl` and `AAPL` are one
//! intent.

use parking_lot::Mutex;
use pulse_core::types::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether the caller wants a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    /// Wanted on the current connection
    Subscribed,
    /// Recorded but not active
    Unsubscribed,
}

/// The caller's wish for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionIntent {
    /// Normalized ticker
    pub symbol: Symbol,
    /// Current wish
    pub desired_state: DesiredState,
    /// Re-sent after every reconnect
    pub auto_resubscribe: bool,
}

/// Intent set, keyed by normalized symbol.
#[derive(Debug, Default)]
pub struct IntentStore {
    intents: Mutex<BTreeMap<String, SubscriptionIntent>>,
}

impl IntentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `symbols` as subscribed.
    pub fn subscribe(&self, symbols: &[Symbol], auto_resubscribe: bool) {
        let mut intents = self.intents.lock();
        for symbol in symbols {
            intents.insert(
                symbol.as_str().to_string(),
                SubscriptionIntent {
                    symbol: symbol.clone(),
                    desired_state: DesiredState::Subscribed,
                    auto_resubscribe,
                },
            );
        }
    }

    /// Drops the intents for `symbols`. Returns how many existed.
    pub fn unsubscribe(&self, symbols: &[Symbol]) -> usize {
        let mut intents = self.intents.lock();
        symbols
            .iter()
            .filter(|symbol| intents.remove(symbol.as_str()).is_some())
            .count()
    }

    /// Symbols to send on a fresh connection, sorted.
    #[must_use]
    pub fn replay_set(&self) -> Vec<String> {
        self.intents
            .lock()
            .values()
            .filter(|intent| intent.auto_resubscribe && intent.desired_state == DesiredState::Subscribed)
            .map(|intent| intent.symbol.to_string())
            .collect()
    }

    /// Called when a connection ends. Intents that are not replayed become
    /// inactive but stay recorded.
    pub fn connection_lost(&self) {
        for intent in self.intents.lock().values_mut() {
            if !intent.auto_resubscribe {
                intent.desired_state = DesiredState::Unsubscribed;
            }
        }
    }

    /// Current intent for `symbol`, in any accepted spelling.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<SubscriptionIntent> {
        let symbol = Symbol::new(symbol).ok()?;
        self.intents.lock().get(symbol.as_str()).cloned()
    }

    /// Every intent, sorted by symbol.
    #[must_use]
    pub fn all(&self) -> Vec<SubscriptionIntent> {
        self.intents.lock().values().cloned().collect()
    }

    /// Number of recorded intents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.intents.lock().len()
    }

    /// Returns true if no intent is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intents.lock().is_empty()
    }
}
