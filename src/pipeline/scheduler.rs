//! Phase scheduler and worker pool.
//!
//! Three strictly ordered phases (shows/movies, seasons, episodes) with a
//! full barrier between them. Each phase gets fresh work and result channels:
//! one dispatcher feeds the workers (skipping cache-present keys), a bounded
//! worker cohort processes items, and a single collector publishes results to
//! the cache, the failure list, and the progress counters. Everything that
//! blocks races the scheduler's cancellation token.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use mediatidy_common::{ErrorCode, FetchError, Phase, ProviderError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::metadata::merge::{self, MergeInput};
use crate::metadata::types::{Metadata, MetadataFailure, MetadataItem};

use super::{deps, EnrichCtx};

/// What one worker produced for one item.
pub(crate) struct ItemOutcome {
    pub item: MetadataItem,
    pub merged: Option<Metadata>,
    pub failures: Vec<MetadataFailure>,
}

/// Run all phases over `items`, then emit the final summary and `Done`.
pub(crate) async fn run(ctx: Arc<EnrichCtx>, items: Vec<MetadataItem>) {
    ctx.counters.total.store(items.len(), Ordering::SeqCst);
    ctx.counters.processed.store(0, Ordering::SeqCst);
    info!(items = items.len(), "Starting metadata enrichment");

    let mut last_phase = Phase::ShowsAndMovies;
    for phase in Phase::ALL {
        if ctx.cancel.is_cancelled() {
            break;
        }
        last_phase = phase;
        let phase_items: Vec<MetadataItem> =
            items.iter().filter(|i| i.phase == phase).cloned().collect();
        if phase_items.is_empty() {
            continue;
        }
        debug!(phase = %phase, items = phase_items.len(), "Starting phase");
        run_phase(&ctx, phase, phase_items).await;
    }

    ctx.registry.save_caches();
    ctx.publish_summary(last_phase, "", true);
    ctx.progress.done();
    info!(
        processed = ctx.counters.processed.load(Ordering::SeqCst),
        failures = ctx.failures.lock().len(),
        "Enrichment drained"
    );
}

/// Run one phase to completion: dispatch, process, collect, join.
async fn run_phase(ctx: &Arc<EnrichCtx>, phase: Phase, items: Vec<MetadataItem>) {
    ctx.counters.active_workers.store(0, Ordering::SeqCst);

    let worker_count = ctx.worker_count;
    let (work_tx, work_rx) = mpsc::channel::<MetadataItem>(worker_count * 2);
    let (result_tx, mut result_rx) = mpsc::channel::<ItemOutcome>(worker_count * 2);
    let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));

    // Dispatcher: feeds the work channel, skipping keys the cache already
    // holds. Dropping `work_tx` on exit closes the channel.
    let dispatcher = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            for item in items {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                if ctx.cache.contains(&item.key) {
                    ctx.counters.processed.fetch_add(1, Ordering::SeqCst);
                    ctx.publish_summary(phase, &item.descriptor(), false);
                    continue;
                }
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    sent = work_tx.send(item) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    };

    // Worker cohort for this phase; no worker outlives it.
    let mut workers = JoinSet::new();
    for _ in 0..worker_count {
        let ctx = ctx.clone();
        let work_rx = work_rx.clone();
        let result_tx = result_tx.clone();
        workers.spawn(async move {
            loop {
                let item = {
                    let mut rx = work_rx.lock().await;
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => None,
                        item = rx.recv() => item,
                    }
                };
                let Some(item) = item else { break };

                ctx.counters.active_workers.fetch_add(1, Ordering::SeqCst);
                let outcome = process_item(&ctx, phase, &item).await;
                ctx.counters.active_workers.fetch_sub(1, Ordering::SeqCst);

                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    sent = result_tx.send(outcome) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }
    drop(result_tx);

    // Collector: the only writer of pipeline state for this phase.
    let collector = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            while let Some(outcome) = result_rx.recv().await {
                if let Some(merged) = outcome.merged {
                    ctx.cache.insert(&outcome.item.key, merged);
                }
                if !outcome.failures.is_empty() {
                    ctx.record_failures(outcome.failures);
                }
                ctx.counters.processed.fetch_add(1, Ordering::SeqCst);
                ctx.publish_summary(phase, &outcome.item.descriptor(), false);
            }
        })
    };

    let _ = dispatcher.await;
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                ctx.set_fatal(ProviderError::unknown(
                    "pipeline",
                    format!("worker panicked: {e}"),
                ));
            }
        }
    }
    let _ = collector.await;
}

/// Process one item: fan out to every enabled provider that covers its
/// media kind, then merge.
pub(crate) async fn process_item(
    ctx: &EnrichCtx,
    phase: Phase,
    item: &MetadataItem,
) -> ItemOutcome {
    ctx.progress
        .item_started(phase, format!("Fetching metadata for {}", item.descriptor()));
    debug!(key = %item.key, "Processing item");

    let mut results: Vec<MergeInput> = Vec::new();
    let mut failures: Vec<MetadataFailure> = Vec::new();

    for (name, provider, _priority) in ctx.registry.enabled_providers() {
        if ctx.cancel.is_cancelled() {
            break;
        }
        if !provider.capabilities().supports(item.media_kind) {
            continue;
        }

        // Resolve the show dependency before the external call; a failed
        // dependency aborts only this provider's child fetch.
        let request = match deps::prepare_request(ctx, &name, provider.as_ref(), item).await {
            Ok(request) => request,
            Err(FetchError::Cancelled) => break,
            Err(FetchError::Provider(error)) => {
                if error.code != ErrorCode::NotFound {
                    failures.push(failure_for(item, &name, &item.name, error));
                }
                continue;
            }
        };

        if let Err(e) = ctx.limiters.acquire(&name, &ctx.cancel).await {
            match e {
                FetchError::Cancelled => break,
                FetchError::Provider(error) => {
                    failures.push(failure_for(item, &name, &request.name, error));
                    continue;
                }
            }
        }

        let fetched = tokio::select! {
            _ = ctx.cancel.cancelled() => Err(FetchError::Cancelled),
            result = provider.fetch(&ctx.cancel, &request) => result,
        };
        match fetched {
            Ok(metadata) => results.push(MergeInput {
                provider: name.clone(),
                metadata,
            }),
            Err(FetchError::Cancelled) => break,
            Err(FetchError::Provider(error)) if error.code == ErrorCode::NotFound => {
                // Providers routinely disagree on coverage.
                debug!(provider = %name, key = %item.key, "Not found");
            }
            Err(FetchError::Provider(error)) => {
                failures.push(failure_for(item, &name, &request.name, error));
            }
        }
    }

    // A configured merge preference reorders the primary; the rest keep
    // registry priority order.
    if let Some(prefer) = &ctx.prefer {
        if let Some(position) = results.iter().position(|r| &r.provider == prefer) {
            let preferred = results.remove(position);
            results.insert(0, preferred);
        }
    }

    let merged = merge::merge_results(&results);
    ItemOutcome {
        item: item.clone(),
        merged,
        failures,
    }
}

fn failure_for(
    item: &MetadataItem,
    provider: &str,
    query: &str,
    error: ProviderError,
) -> MetadataFailure {
    MetadataFailure {
        item: item.clone(),
        provider: provider.to_string(),
        query: query.to_string(),
        attempts: 1,
        error,
        dismissed: false,
    }
}
