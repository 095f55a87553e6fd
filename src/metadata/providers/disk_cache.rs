//! Opaque on-disk response cache, one blob file per provider.
//!
//! The blob is loaded at construction if present and written on explicit
//! [`DiskCache::save`]. Corrupt or missing files are treated as an empty
//! cache. Entries are JSON-encoded records inside a bincode envelope; the
//! content is provider-owned and opaque to everything else.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use mediatidy_common::ProviderError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::metadata::types::Metadata;

/// On-disk envelope. Entries stay opaque byte strings.
#[derive(Serialize, Deserialize)]
struct Blob {
    saved_at: String,
    entries: HashMap<String, Vec<u8>>,
}

/// A provider-owned response cache persisted as a single file.
pub struct DiskCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl DiskCache {
    /// Open the cache at `path`, loading the existing blob when present.
    pub fn load(path: PathBuf) -> Self {
        let entries = match std::fs::read(&path) {
            Ok(bytes) => match bincode::deserialize::<Blob>(&bytes) {
                Ok(blob) => {
                    debug!(
                        path = %path.display(),
                        entries = blob.entries.len(),
                        saved_at = %blob.saved_at,
                        "Loaded provider cache blob"
                    );
                    blob.entries
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring corrupt provider cache blob");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Look up a cached record.
    pub fn get(&self, key: &str) -> Option<Metadata> {
        let entries = self.entries.lock();
        let bytes = entries.get(key)?;
        serde_json::from_slice(bytes).ok()
    }

    /// Store a record under `key`. Unencodable records are dropped.
    pub fn put(&self, key: &str, metadata: &Metadata) {
        match serde_json::to_vec(metadata) {
            Ok(bytes) => {
                self.entries.lock().insert(key.to_string(), bytes);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode cache entry");
            }
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Write the blob to disk.
    pub fn save(&self, provider: &str) -> Result<(), ProviderError> {
        let blob = Blob {
            saved_at: Utc::now().to_rfc3339(),
            entries: self.entries.lock().clone(),
        };
        let bytes = bincode::serialize(&blob)
            .map_err(|e| ProviderError::unknown(provider, format!("cache encode failed: {e}")))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ProviderError::unknown(provider, format!("cache directory create failed: {e}"))
            })?;
        }
        std::fs::write(&self.path, bytes)
            .map_err(|e| ProviderError::unknown(provider, format!("cache write failed: {e}")))?;
        Ok(())
    }
}
