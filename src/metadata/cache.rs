//! In-memory concurrent metadata cache, keyed by fingerprint.
//!
//! Records are published immutably: once inserted, an `Arc<Metadata>` is
//! shared by every reader and never mutated. [`MetadataCache::get_or_fetch`]
//! provides singleflight semantics so a key is fetched at most once even
//! under concurrent demand. Failed fetches are never cached — every retry
//! re-issues the lookup.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use mediatidy_common::FetchError;
use tokio::sync::Mutex;

use super::types::Metadata;

/// Concurrent fingerprint-keyed cache of published metadata records.
///
/// The empty key (unknown media kind) is uncacheable: lookups miss and
/// inserts are dropped.
pub struct MetadataCache {
    entries: DashMap<String, Arc<Metadata>>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl MetadataCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    /// Look up a published record.
    pub fn get(&self, key: &str) -> Option<Arc<Metadata>> {
        if key.is_empty() {
            return None;
        }
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Whether a record is published under `key`.
    pub fn contains(&self, key: &str) -> bool {
        !key.is_empty() && self.entries.contains_key(key)
    }

    /// Publish a record. Returns the shared handle; the empty key is dropped
    /// without storing.
    pub fn insert(&self, key: &str, metadata: Metadata) -> Arc<Metadata> {
        let record = Arc::new(metadata);
        if !key.is_empty() {
            self.entries.insert(key.to_string(), record.clone());
        }
        record
    }

    /// Replace a published record (used when retry mode re-merges).
    pub fn replace(&self, key: &str, metadata: Metadata) -> Arc<Metadata> {
        self.insert(key, metadata)
    }

    /// Number of published records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Published keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Return the record under `key`, fetching and publishing it when absent.
    ///
    /// Concurrent callers for the same key coalesce onto one fetch; the rest
    /// observe the published record. Errors propagate to the caller whose
    /// fetch ran and are not cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Arc<Metadata>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Metadata, FetchError>>,
    {
        if key.is_empty() {
            return fetch().await.map(Arc::new);
        }
        if let Some(found) = self.get(key) {
            return Ok(found);
        }

        let gate = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = gate.lock().await;

        // A concurrent flight may have published while we waited.
        if let Some(found) = self.get(key) {
            drop(guard);
            self.inflight.remove(key);
            return Ok(found);
        }

        let result = fetch().await;
        let outcome = result.map(|metadata| self.insert(key, metadata));
        drop(guard);
        self.inflight.remove(key);
        outcome
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}
