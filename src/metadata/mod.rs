//! Metadata contracts, providers, merging, and caching.
//!
//! The [`provider::Provider`] trait is the plugin seam: the
//! [`registry::ProviderRegistry`] holds the named, priority-ordered
//! implementations, [`merge`] composes their responses into one record, and
//! [`cache::MetadataCache`] publishes the results.

pub mod cache;
pub mod merge;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod types;
