//! Provider registry: named, priority-ordered, capability-validated plugins.
//!
//! The registry is an explicitly passed value (typically `Arc`-wrapped), not
//! a process global. Writes are serialized behind a `RwLock`; reads proceed
//! concurrently. [`ProviderRegistry::with_builtins`] is the deterministic
//! init routine that loads the bundled providers at startup.

use std::collections::HashMap;
use std::sync::Arc;

use mediatidy_common::{ErrorCode, ProviderError};
use parking_lot::RwLock;
use serde_json::json;
use tracing::{info, warn};

use crate::config::EnrichmentConfig;

use super::provider::{Provider, ProviderOptions};
use super::providers::{FfprobeProvider, LocalProvider, OmdbProvider, TmdbProvider};

struct Entry {
    provider: Arc<dyn Provider>,
    priority: i32,
    enabled: bool,
    options: Option<ProviderOptions>,
}

/// A registry of [`Provider`]s with priority ordering and enablement state.
pub struct ProviderRegistry {
    inner: RwLock<HashMap<String, Entry>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry pre-loaded with the bundled providers (local, tmdb,
    /// omdb, ffprobe), configured and enabled according to `config`.
    pub fn with_builtins(config: &EnrichmentConfig) -> Result<Self, ProviderError> {
        let registry = Self::new();

        let local = Arc::new(LocalProvider::new());
        registry.register(local, 0)?;
        if config.providers.local.enabled {
            registry.enable("local")?;
        }

        let tmdb = Arc::new(TmdbProvider::new(
            config.providers.tmdb.cache_path.clone(),
        ));
        registry.register(tmdb, 100)?;
        if let Some(key) = &config.providers.tmdb.api_key {
            let mut options = ProviderOptions::new();
            options.insert("api_key".to_string(), json!(key));
            options.insert("language".to_string(), json!(config.language));
            registry.configure("tmdb", options)?;
        }
        if config.providers.tmdb.enabled {
            registry.enable("tmdb")?;
        }

        let omdb = Arc::new(OmdbProvider::new(
            config.providers.omdb.cache_path.clone(),
        ));
        registry.register(omdb, 80)?;
        if let Some(key) = &config.providers.omdb.api_key {
            let mut options = ProviderOptions::new();
            options.insert("api_key".to_string(), json!(key));
            registry.configure("omdb", options)?;
        }
        if config.providers.omdb.enabled {
            registry.enable("omdb")?;
        }

        let ffprobe = Arc::new(FfprobeProvider::new(
            config.providers.ffprobe.binary_path.clone(),
        ));
        registry.register(ffprobe, 10)?;
        if config.providers.ffprobe.enabled {
            registry.enable("ffprobe")?;
        }

        info!(
            providers = ?registry.list(),
            "Loaded built-in metadata providers"
        );
        Ok(registry)
    }

    /// Register a provider under its own name with the given priority.
    ///
    /// Fails when the name is already taken or the provider declares no
    /// media kinds.
    pub fn register(&self, provider: Arc<dyn Provider>, priority: i32) -> Result<(), ProviderError> {
        let name = provider.name();
        let caps = provider.capabilities();
        if caps.media_kinds.is_empty() {
            return Err(ProviderError::invalid_request(
                name,
                "provider declares no media kinds",
            ));
        }

        let mut inner = self.inner.write();
        if inner.contains_key(name) {
            return Err(ProviderError::invalid_request(
                name,
                format!("provider name already registered: {name}"),
            ));
        }
        inner.insert(
            name.to_string(),
            Entry {
                provider,
                priority,
                enabled: false,
                options: None,
            },
        );
        Ok(())
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.inner.read().get(name).map(|e| e.provider.clone())
    }

    /// The priority a provider was registered with.
    pub fn priority_of(&self, name: &str) -> Option<i32> {
        self.inner.read().get(name).map(|e| e.priority)
    }

    /// All registered provider names, by descending priority; ties break
    /// lexicographically.
    pub fn list(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut names: Vec<(String, i32)> = inner
            .iter()
            .map(|(name, entry)| (name.clone(), entry.priority))
            .collect();
        names.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        names.into_iter().map(|(name, _)| name).collect()
    }

    /// Enable a provider.
    ///
    /// Fails when the provider requires auth and no configuration has been
    /// stored for it.
    pub fn enable(&self, name: &str) -> Result<(), ProviderError> {
        let mut inner = self.inner.write();
        let entry = inner
            .get_mut(name)
            .ok_or_else(|| ProviderError::invalid_request(name, "provider not registered"))?;

        if entry.provider.capabilities().requires_auth && entry.options.is_none() {
            return Err(ProviderError::new(
                name,
                ErrorCode::AuthFailed,
                "provider requires configuration before it can be enabled",
            ));
        }
        entry.enabled = true;
        Ok(())
    }

    /// Disable a provider. Unknown names are ignored.
    pub fn disable(&self, name: &str) {
        if let Some(entry) = self.inner.write().get_mut(name) {
            entry.enabled = false;
        }
    }

    /// Whether a provider is currently enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.inner.read().get(name).is_some_and(|e| e.enabled)
    }

    /// Apply options to a provider, then store them.
    pub fn configure(&self, name: &str, options: ProviderOptions) -> Result<(), ProviderError> {
        let mut inner = self.inner.write();
        let entry = inner
            .get_mut(name)
            .ok_or_else(|| ProviderError::invalid_request(name, "provider not registered"))?;
        entry.provider.configure(&options)?;
        entry.options = Some(options);
        Ok(())
    }

    /// Enabled providers in descending priority order (ties by name).
    pub fn enabled_providers(&self) -> Vec<(String, Arc<dyn Provider>, i32)> {
        let inner = self.inner.read();
        let mut providers: Vec<(String, Arc<dyn Provider>, i32)> = inner
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(name, entry)| (name.clone(), entry.provider.clone(), entry.priority))
            .collect();
        providers.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        providers
    }

    /// Ask every provider to persist its on-disk cache blob.
    pub fn save_caches(&self) {
        let inner = self.inner.read();
        for (name, entry) in inner.iter() {
            if let Err(e) = entry.provider.save_cache() {
                warn!(provider = %name, error = %e, "Failed to save provider cache");
            }
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
