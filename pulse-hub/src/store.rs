//! Key-value persistence collaborator.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

/// Persistence failure.
#[derive(Debug, Clone, Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

/// Get/put store for state the hub keeps outside its registries.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Reads the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Writes `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Process-local store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: DashMap<String, Value>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl QuoteStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_replaces() {
        let store = InMemoryStore::new();
        assert!(store.get("quote:AAPL").await.unwrap().is_none());

        store.put("quote:AAPL", json!({"price": "1"})).await.unwrap();
        store.put("quote:AAPL", json!({"price": "2"})).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get("quote:AAPL").await.unwrap(),
            Some(json!({"price": "2"}))
        );
    }
}
