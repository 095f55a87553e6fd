//! Configuration for the enrichment core.
//!
//! All fields default so an empty TOML document yields a working (if
//! providerless) configuration. Secrets handling stays with the caller; the
//! config only carries the values it was handed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Top-level configuration for an enrichment run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrichmentConfig {
    /// Number of concurrent workers per phase.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Preferred metadata language (ISO tag, e.g. "en-US").
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub merge: MergePolicy,

    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Per-provider rate-limit overrides, keyed by provider name.
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitConfig>,
}

fn default_worker_count() -> usize {
    20
}

fn default_language() -> String {
    "en-US".to_string()
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            language: default_language(),
            merge: MergePolicy::default(),
            providers: ProvidersConfig::default(),
            rate_limits: HashMap::new(),
        }
    }
}

impl EnrichmentConfig {
    /// Parse a configuration from a TOML document.
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("Failed to parse enrichment configuration")
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&raw)
    }
}

/// How the merger ranks provider outputs.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MergePolicy {
    /// Provider whose record becomes primary when it produced one. Empty
    /// means registry priority order decides.
    #[serde(default)]
    pub prefer: Option<String>,
}

/// Per-provider options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub local: LocalProviderConfig,

    #[serde(default)]
    pub tmdb: CatalogProviderConfig,

    #[serde(default)]
    pub omdb: CatalogProviderConfig,

    #[serde(default)]
    pub ffprobe: FfprobeProviderConfig,
}

/// Options for the zero-auth local provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for LocalProviderConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Options for an external catalog provider (TMDB, OMDb).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogProviderConfig {
    #[serde(default)]
    pub enabled: bool,

    /// API key; required before the provider can be enabled.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Optional on-disk response cache blob, one file per provider.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
}

/// Options for the ffprobe technical probe provider.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FfprobeProviderConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Path to the ffprobe binary; discovered on `PATH` when unset.
    #[serde(default)]
    pub binary_path: Option<PathBuf>,
}

/// Sliding-window rate limit settings for one provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_min_spacing_ms")]
    pub min_spacing_ms: u64,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_requests() -> usize {
    40
}
fn default_window_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    4
}
fn default_min_spacing_ms() -> u64 {
    250
}
fn default_backoff_ms() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            max_retries: default_max_retries(),
            min_spacing_ms: default_min_spacing_ms(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RateLimitConfig {
    /// Window duration as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Minimum spacing between admissions.
    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }

    /// Base backoff applied to repeated waits.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}
