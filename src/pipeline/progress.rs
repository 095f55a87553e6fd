//! Progress events streamed to a single consumer.
//!
//! Discrete events (`ItemStarted`, `ItemResolved`, `FatalError`, `Done`) are
//! delivered losslessly over an unbounded channel. Pipeline summaries are
//! coalesced through a watch channel: a slow consumer only ever sees the most
//! recent snapshot.

use std::sync::Arc;

use mediatidy_common::{Phase, ProviderError};
use tokio::sync::{mpsc, watch};

/// A discrete, lossless pipeline event.
#[derive(Debug, Clone)]
pub enum EnrichmentEvent {
    /// A worker picked up an item.
    ItemStarted { phase: Phase, descriptor: String },
    /// Retry mode resolved a failure via the named provider.
    ItemResolved { key: String, provider: String },
    /// The pipeline hit a fatal error; no more events follow except `Done`.
    FatalError { error: ProviderError },
    /// Final sentinel once all phases drain.
    Done,
}

/// Coalesced snapshot of pipeline progress; most recent wins.
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub total_items: usize,
    pub processed_items: usize,
    pub active_workers: usize,
    pub active_providers: Vec<String>,
    pub phase_name: String,
    pub last_item: String,
    pub done: bool,
    pub worker_limit: usize,
}

/// Sending half, owned by the pipeline.
#[derive(Clone)]
pub struct ProgressSender {
    events: mpsc::UnboundedSender<EnrichmentEvent>,
    summary: Arc<watch::Sender<PipelineSummary>>,
}

/// Receiving half, owned by the consumer (UI).
pub struct EventStream {
    /// Lossless event channel.
    pub events: mpsc::UnboundedReceiver<EnrichmentEvent>,
    /// Coalesced summary channel.
    pub summary: watch::Receiver<PipelineSummary>,
}

impl EventStream {
    /// The summary channel as a `Stream`, convenient for UI select loops.
    pub fn summaries(&self) -> tokio_stream::wrappers::WatchStream<PipelineSummary> {
        tokio_stream::wrappers::WatchStream::new(self.summary.clone())
    }
}

/// Create a connected sender/stream pair.
pub fn channel() -> (ProgressSender, EventStream) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (summary_tx, summary_rx) = watch::channel(PipelineSummary::default());
    (
        ProgressSender {
            events: event_tx,
            summary: Arc::new(summary_tx),
        },
        EventStream {
            events: event_rx,
            summary: summary_rx,
        },
    )
}

impl ProgressSender {
    /// Emit an `ItemStarted` event. Send errors (consumer gone) are ignored.
    pub fn item_started(&self, phase: Phase, descriptor: String) {
        let _ = self
            .events
            .send(EnrichmentEvent::ItemStarted { phase, descriptor });
    }

    /// Emit an `ItemResolved` event.
    pub fn item_resolved(&self, key: &str, provider: &str) {
        let _ = self.events.send(EnrichmentEvent::ItemResolved {
            key: key.to_string(),
            provider: provider.to_string(),
        });
    }

    /// Emit a `FatalError` event.
    pub fn fatal(&self, error: ProviderError) {
        let _ = self.events.send(EnrichmentEvent::FatalError { error });
    }

    /// Emit the final `Done` sentinel.
    pub fn done(&self) {
        let _ = self.events.send(EnrichmentEvent::Done);
    }

    /// Publish a summary snapshot, replacing any unconsumed one.
    pub fn publish_summary(&self, summary: PipelineSummary) {
        let _ = self.summary.send(summary);
    }
}
