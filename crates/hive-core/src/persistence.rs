//! Opaque persistence contract.
//!
//! The core never owns a database; it depends on a key-value store for
//! entity snapshots and an append-only log for execution history, both
//! behind small `async` traits. `memory` ships an in-process reference
//! implementation for tests and the CLI, standing in for the real
//! collaborator.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;

/// Minimal async key-value store, namespaced by collection.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, collection: &str, key: &str, value: Vec<u8>) -> Result<()>;
    async fn delete(&self, collection: &str, key: &str) -> Result<()>;
    async fn list_keys(&self, collection: &str) -> Result<Vec<String>>;
}

/// Append-only log, namespaced by stream (e.g. `"execution_history"`).
#[async_trait]
pub trait AppendLog: Send + Sync {
    async fn append(&self, stream: &str, entry: Vec<u8>) -> Result<()>;
    async fn read(&self, stream: &str, limit: Option<usize>) -> Result<Vec<Vec<u8>>>;
}

/// Convenience helpers over `KvStore` for JSON-serializable entities.
/// Kept as free functions rather than trait defaults so `KvStore` itself
/// stays object-safe.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    collection: &str,
    key: &str,
) -> Result<Option<T>> {
    match store.get(collection, key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub async fn put_json<T: Serialize + Sync>(
    store: &dyn KvStore,
    collection: &str,
    key: &str,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.put(collection, key, bytes).await
}

pub async fn append_json<T: Serialize + Sync>(
    log: &dyn AppendLog,
    stream: &str,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    log.append(stream, bytes).await
}

/// In-memory reference implementation of both contracts, backed by
/// `DashMap`/`parking_lot::Mutex<Vec<_>>` the way the rest of this crate's
/// synchronous in-process state is held.
pub mod memory {
    use super::*;
    use dashmap::DashMap;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    pub struct MemoryStore {
        collections: DashMap<String, DashMap<String, Vec<u8>>>,
        streams: DashMap<String, Mutex<Vec<Vec<u8>>>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl KvStore for MemoryStore {
        async fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self
                .collections
                .get(collection)
                .and_then(|c| c.get(key).map(|v| v.clone())))
        }

        async fn put(&self, collection: &str, key: &str, value: Vec<u8>) -> Result<()> {
            self.collections
                .entry(collection.to_string())
                .or_default()
                .insert(key.to_string(), value);
            Ok(())
        }

        async fn delete(&self, collection: &str, key: &str) -> Result<()> {
            if let Some(c) = self.collections.get(collection) {
                c.remove(key);
            }
            Ok(())
        }

        async fn list_keys(&self, collection: &str) -> Result<Vec<String>> {
            Ok(self
                .collections
                .get(collection)
                .map(|c| c.iter().map(|e| e.key().clone()).collect())
                .unwrap_or_default())
        }
    }

    #[async_trait]
    impl AppendLog for MemoryStore {
        async fn append(&self, stream: &str, entry: Vec<u8>) -> Result<()> {
            self.streams
                .entry(stream.to_string())
                .or_default()
                .lock()
                .push(entry);
            Ok(())
        }

        async fn read(&self, stream: &str, limit: Option<usize>) -> Result<Vec<Vec<u8>>> {
            let Some(entries) = self.streams.get(stream) else {
                return Ok(Vec::new());
            };
            let guard = entries.lock();
            match limit {
                Some(n) => Ok(guard.iter().rev().take(n).rev().cloned().collect()),
                None => Ok(guard.clone()),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn put_then_get_roundtrips() {
            let store = MemoryStore::new();
            put_json(&store, "agents", "agent_1", &"payload").await.unwrap();
            let value: Option<String> = get_json(&store, "agents", "agent_1").await.unwrap();
            assert_eq!(value, Some("payload".to_string()));
        }

        #[tokio::test]
        async fn append_log_respects_limit() {
            let log = MemoryStore::new();
            for i in 0..5 {
                append_json(&log, "history", &i).await.unwrap();
            }
            let entries = log.read("history", Some(2)).await.unwrap();
            assert_eq!(entries.len(), 2);
            let last: i32 = serde_json::from_slice(&entries[1]).unwrap();
            assert_eq!(last, 4);
        }
    }
}
