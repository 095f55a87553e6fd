//! # mediatidy
//!
//! The metadata enrichment core of a media-library organizer.
//!
//! Given a tree of movie/show/season/episode nodes, mediatidy classifies each
//! node, resolves external identifiers, fetches and merges metadata from
//! several independent providers under per-provider rate limits, streams
//! progress events to a consumer, and keeps failed lookups around for
//! interactive retry.
//!
//! The crate is a library: tree construction, configuration persistence, and
//! UI rendering live with the caller. The typical flow is:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mediatidy::config::EnrichmentConfig;
//! use mediatidy::metadata::registry::ProviderRegistry;
//! use mediatidy::pipeline::Enricher;
//! use mediatidy::scan;
//!
//! let config = EnrichmentConfig::default();
//! let registry = Arc::new(ProviderRegistry::with_builtins(&config)?);
//! let items = scan::enumerate(&tree);
//!
//! let (enricher, mut events) = Enricher::new(registry, config);
//! enricher.run(items).await;
//!
//! if let Some(fatal) = enricher.err() {
//!     eprintln!("enrichment failed: {fatal}");
//! }
//! let mut retry = enricher.retry_controller();
//! ```

pub mod config;
pub mod metadata;
pub mod pipeline;
pub mod scan;

pub use mediatidy_common::{fingerprint, ErrorCode, FetchError, MediaKind, Phase, ProviderError};
