//! Per-provider sliding-window rate limiting.
//!
//! Admission rules, in order: enforce a minimum spacing between admissions,
//! evict window-expired timestamps, admit when under budget, otherwise sleep
//! until the oldest admission ages out (plus bounded jitter and exponential
//! backoff) and try again. A caller that exhausts its retries fails with
//! `RATE_LIMITED`. Waiting callers queue FIFO on the internal mutex, and the
//! lock is never held across a sleep.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mediatidy_common::{FetchError, ProviderError};
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RateLimitConfig;

/// Upper bound on the random jitter added to window waits.
const MAX_JITTER_MS: u64 = 500;

/// Settings for one provider's limiter.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub max_requests: usize,
    pub window: Duration,
    pub max_retries: u32,
    pub min_spacing: Duration,
    pub backoff: Duration,
}

impl From<&RateLimitConfig> for RateLimitSettings {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests.max(1),
            window: config.window(),
            max_retries: config.max_retries,
            min_spacing: config.min_spacing(),
            backoff: config.backoff(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

struct WindowState {
    admitted: VecDeque<Instant>,
    last_admitted: Option<Instant>,
    retry_count: u32,
}

/// A sliding-window limiter for one provider.
pub struct SlidingWindowLimiter {
    name: String,
    settings: RateLimitSettings,
    state: Mutex<WindowState>,
}

impl SlidingWindowLimiter {
    /// Create a limiter named after its provider.
    pub fn new(name: &str, settings: RateLimitSettings) -> Self {
        Self {
            name: name.to_string(),
            settings: RateLimitSettings {
                max_requests: settings.max_requests.max(1),
                ..settings
            },
            state: Mutex::new(WindowState {
                admitted: VecDeque::new(),
                last_admitted: None,
                retry_count: 0,
            }),
        }
    }

    /// Wait for admission. Fails with `RATE_LIMITED` after the retry budget
    /// is spent, or `Cancelled` when the token fires during a wait.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), FetchError> {
        loop {
            let mut state = self.state.lock().await;
            let now = Instant::now();

            // Minimum spacing between consecutive admissions.
            if let Some(last) = state.last_admitted {
                let since = now.duration_since(last);
                if since < self.settings.min_spacing {
                    let pause = self.settings.min_spacing - since;
                    drop(state);
                    self.sleep(pause, cancel).await?;
                    continue;
                }
            }

            // Evict admissions that fell out of the rolling window.
            while state
                .admitted
                .front()
                .is_some_and(|t| now.duration_since(*t) >= self.settings.window)
            {
                state.admitted.pop_front();
            }

            if state.admitted.len() < self.settings.max_requests {
                state.admitted.push_back(now);
                state.last_admitted = Some(now);
                state.retry_count = 0;
                return Ok(());
            }

            // Window is full: wait for the oldest admission to age out.
            let Some(&oldest) = state.admitted.front() else {
                continue;
            };
            let mut wait = self
                .settings
                .window
                .saturating_sub(now.duration_since(oldest));
            wait += Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_JITTER_MS));
            if state.retry_count > 0 {
                let backoff = self
                    .settings
                    .backoff
                    .saturating_mul(2u32.saturating_pow(state.retry_count - 1));
                wait = wait.max(backoff);
            }

            if state.retry_count >= self.settings.max_retries {
                state.retry_count = 0;
                return Err(ProviderError::rate_limited(
                    &self.name,
                    "rate limit retries exhausted",
                    wait.as_secs(),
                )
                .into());
            }
            state.retry_count += 1;
            drop(state);
            self.sleep(wait, cancel).await?;
        }
    }

    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), FetchError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Limiters for all providers, keyed by provider name.
///
/// Providers without an entry are unlimited; the bundled external catalogs
/// get default windows unless the configuration overrides them.
pub struct RateLimiterSet {
    limiters: DashMap<String, Arc<SlidingWindowLimiter>>,
}

impl RateLimiterSet {
    /// Build the set from configuration, seeding defaults for the bundled
    /// external catalogs.
    pub fn from_config(overrides: &HashMap<String, RateLimitConfig>) -> Self {
        let mut configs: HashMap<String, RateLimitConfig> = HashMap::new();
        configs.insert("tmdb".to_string(), RateLimitConfig::default());
        configs.insert(
            "omdb".to_string(),
            RateLimitConfig {
                max_requests: 10,
                ..RateLimitConfig::default()
            },
        );
        for (name, config) in overrides {
            configs.insert(name.clone(), config.clone());
        }

        let limiters = DashMap::new();
        for (name, config) in &configs {
            limiters.insert(
                name.clone(),
                Arc::new(SlidingWindowLimiter::new(name, RateLimitSettings::from(config))),
            );
        }
        Self { limiters }
    }

    /// The limiter for a provider, when one is configured.
    pub fn get(&self, provider: &str) -> Option<Arc<SlidingWindowLimiter>> {
        self.limiters.get(provider).map(|l| l.value().clone())
    }

    /// Install or replace a provider's limiter.
    pub fn insert(&self, provider: &str, settings: RateLimitSettings) {
        self.limiters.insert(
            provider.to_string(),
            Arc::new(SlidingWindowLimiter::new(provider, settings)),
        );
    }

    /// Acquire admission for a provider; a no-op for unlimited providers.
    pub async fn acquire(
        &self,
        provider: &str,
        cancel: &CancellationToken,
    ) -> Result<(), FetchError> {
        match self.get(provider) {
            Some(limiter) => limiter.acquire(cancel).await,
            None => Ok(()),
        }
    }
}
