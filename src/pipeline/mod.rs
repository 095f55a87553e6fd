//! The enrichment pipeline: phase scheduling, worker pool, dependency
//! resolution, rate limiting, progress, and interactive retry.
//!
//! [`Enricher`] is the facade. It owns the cancellation token, the shared
//! cache, the per-provider rate limiters, and the failure list; `run` drives
//! the three phases to completion and `retry_controller` hands the collected
//! failures to interactive retry.

pub mod progress;
pub mod ratelimit;
pub mod retry;

mod deps;
mod scheduler;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mediatidy_common::{Phase, ProviderError};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::EnrichmentConfig;
use crate::metadata::cache::MetadataCache;
use crate::metadata::registry::ProviderRegistry;
use crate::metadata::types::{MetadataFailure, MetadataItem};

use progress::{EventStream, PipelineSummary, ProgressSender};
use ratelimit::RateLimiterSet;
use retry::RetryController;

/// Progress counters shared across tasks.
pub(crate) struct Counters {
    pub total: AtomicUsize,
    pub processed: AtomicUsize,
    pub active_workers: AtomicUsize,
}

/// Shared state threaded through the scheduler, workers, and retry mode.
pub(crate) struct EnrichCtx {
    pub registry: Arc<ProviderRegistry>,
    pub cache: Arc<MetadataCache>,
    pub limiters: RateLimiterSet,
    pub language: Option<String>,
    pub prefer: Option<String>,
    pub worker_count: usize,
    pub cancel: CancellationToken,
    pub counters: Counters,
    pub failures: Mutex<Vec<MetadataFailure>>,
    pub fatal: Mutex<Option<ProviderError>>,
    pub progress: ProgressSender,
}

impl EnrichCtx {
    /// Append failures from one item, promoting the first fatal error.
    pub fn record_failures(&self, new_failures: Vec<MetadataFailure>) {
        for failure in &new_failures {
            warn!(
                item = %failure.item.key,
                provider = %failure.provider,
                error = %failure.error,
                "Provider lookup failed"
            );
            if failure.error.is_fatal() {
                let mut fatal = self.fatal.lock();
                if fatal.is_none() {
                    *fatal = Some(failure.error.clone());
                }
            }
        }
        self.failures.lock().extend(new_failures);
    }

    /// Record a fatal pipeline error and emit the `FatalError` event.
    pub fn set_fatal(&self, error: ProviderError) {
        {
            let mut fatal = self.fatal.lock();
            if fatal.is_none() {
                *fatal = Some(error.clone());
            }
        }
        self.progress.fatal(error);
    }

    /// Publish a summary snapshot for the current phase.
    pub fn publish_summary(&self, phase: Phase, last_item: &str, done: bool) {
        let active_providers = self
            .registry
            .enabled_providers()
            .into_iter()
            .map(|(name, _, _)| name)
            .collect();
        self.progress.publish_summary(PipelineSummary {
            total_items: self.counters.total.load(Ordering::SeqCst),
            processed_items: self.counters.processed.load(Ordering::SeqCst),
            active_workers: self.counters.active_workers.load(Ordering::SeqCst),
            active_providers,
            phase_name: phase.display_name().to_string(),
            last_item: last_item.to_string(),
            done,
            worker_limit: self.worker_count,
        });
    }
}

/// The enrichment engine.
pub struct Enricher {
    ctx: Arc<EnrichCtx>,
}

impl Enricher {
    /// Create an enricher over the given registry and configuration,
    /// returning the event stream for the consumer.
    pub fn new(registry: Arc<ProviderRegistry>, config: EnrichmentConfig) -> (Self, EventStream) {
        let (progress, stream) = progress::channel();
        let ctx = Arc::new(EnrichCtx {
            registry,
            cache: Arc::new(MetadataCache::new()),
            limiters: RateLimiterSet::from_config(&config.rate_limits),
            language: Some(config.language.clone()),
            prefer: config.merge.prefer.clone(),
            worker_count: config.worker_count.max(1),
            cancel: CancellationToken::new(),
            counters: Counters {
                total: AtomicUsize::new(0),
                processed: AtomicUsize::new(0),
                active_workers: AtomicUsize::new(0),
            },
            failures: Mutex::new(Vec::new()),
            fatal: Mutex::new(None),
            progress,
        });
        (Self { ctx }, stream)
    }

    /// The cancellation token driving every blocking operation.
    pub fn cancel_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Cancel the pipeline: stops dispatch, unblocks workers, and still
    /// delivers a final `Done` event.
    pub fn cancel(&self) {
        self.ctx.cancel.cancel();
    }

    /// The shared metadata cache.
    pub fn cache(&self) -> Arc<MetadataCache> {
        self.ctx.cache.clone()
    }

    /// Items processed so far (including cache-hit skips).
    pub fn processed_items(&self) -> usize {
        self.ctx.counters.processed.load(Ordering::SeqCst)
    }

    /// Total items of the current run.
    pub fn total_items(&self) -> usize {
        self.ctx.counters.total.load(Ordering::SeqCst)
    }

    /// Snapshot of the recorded failures.
    pub fn failures(&self) -> Vec<MetadataFailure> {
        self.ctx.failures.lock().clone()
    }

    /// The fatal error, if any: set when a `FatalError` event was emitted or
    /// when the aggregated failures contain `AUTH_FAILED` or `UNAVAILABLE`.
    pub fn err(&self) -> Option<ProviderError> {
        if let Some(fatal) = self.ctx.fatal.lock().clone() {
            return Some(fatal);
        }
        self.ctx
            .failures
            .lock()
            .iter()
            .find(|f| f.error.is_fatal())
            .map(|f| f.error.clone())
    }

    /// Run the three phases over `items` to completion (or cancellation).
    pub async fn run(&self, items: Vec<MetadataItem>) {
        scheduler::run(self.ctx.clone(), items).await;
    }

    /// Hand the collected failures to an interactive retry controller. The
    /// controller owns them from here on.
    pub fn retry_controller(&self) -> RetryController {
        let failures = std::mem::take(&mut *self.ctx.failures.lock());
        RetryController::new(self.ctx.clone(), failures)
    }
}
