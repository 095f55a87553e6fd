//! Interactive retry of failed lookups.
//!
//! After the pipeline drains, the remaining failures move into a
//! [`RetryController`]. The consumer walks them in insertion order, edits the
//! search query, and re-runs a single provider's fetch for the selected item.
//! Retries go through the same rate limiter and dependency resolution as the
//! pipeline; only the user can decide whether a query was semantically wrong,
//! which is why this is a post-drain mode and not in-pipeline retry.

use std::sync::Arc;

use mediatidy_common::{FetchError, ProviderError};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::metadata::merge::{merge_results, MergeInput};
use crate::metadata::types::{Metadata, MetadataFailure, MetadataItem};

use super::{deps, EnrichCtx};

/// Owns the failure list after the pipeline drains.
pub struct RetryController {
    ctx: Arc<EnrichCtx>,
    failures: Vec<MetadataFailure>,
    selected: usize,
}

impl RetryController {
    pub(crate) fn new(ctx: Arc<EnrichCtx>, failures: Vec<MetadataFailure>) -> Self {
        Self {
            ctx,
            failures,
            selected: 0,
        }
    }

    /// All failures, in insertion order (dismissed ones included).
    pub fn failures(&self) -> &[MetadataFailure] {
        &self.failures
    }

    /// Whether any failures remain at all.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Count of failures not yet dismissed.
    pub fn remaining(&self) -> usize {
        self.failures.iter().filter(|f| !f.dismissed).count()
    }

    /// The currently selected failure.
    pub fn selected(&self) -> Option<&MetadataFailure> {
        self.failures.get(self.selected)
    }

    /// Move the selection forward, wrapping around.
    pub fn select_next(&mut self) {
        if !self.failures.is_empty() {
            self.selected = (self.selected + 1) % self.failures.len();
        }
    }

    /// Move the selection backward, wrapping around.
    pub fn select_prev(&mut self) {
        if !self.failures.is_empty() {
            self.selected = (self.selected + self.failures.len() - 1) % self.failures.len();
        }
    }

    /// Dismiss the selected failure without retrying and advance.
    pub fn skip(&mut self) {
        if let Some(failure) = self.failures.get_mut(self.selected) {
            failure.dismissed = true;
        }
        self.select_next();
    }

    /// Re-run one provider's fetch for the failure matching `key` +
    /// `provider`, using `query` as the search term override.
    ///
    /// Success removes the failure (re-merging the cached record when the
    /// retry wins priority) and returns `Ok(None)`. A provider error updates
    /// the failure's attempts/error and returns it. Cancellation propagates
    /// and records nothing.
    pub async fn retry_provider(
        &mut self,
        cancel: &CancellationToken,
        key: &str,
        provider_name: &str,
        query: &str,
    ) -> Result<Option<MetadataFailure>, FetchError> {
        let index = self
            .failures
            .iter()
            .position(|f| f.item.key == key && f.provider == provider_name)
            .ok_or_else(|| {
                ProviderError::invalid_request(
                    provider_name,
                    format!("no recorded failure for {key}"),
                )
            })?;
        let provider = self.ctx.registry.get(provider_name).ok_or_else(|| {
            ProviderError::invalid_request(provider_name, "provider not registered")
        })?;

        // The override query drives both the dependency lookup and the fetch.
        let mut item = self.failures[index].item.clone();
        item.name = query.to_string();

        let fetched = async {
            let request =
                deps::prepare_request(&self.ctx, provider_name, provider.as_ref(), &item).await?;
            self.ctx.limiters.acquire(provider_name, cancel).await?;
            tokio::select! {
                _ = cancel.cancelled() => Err(FetchError::Cancelled),
                result = provider.fetch(cancel, &request) => result,
            }
        }
        .await;

        match fetched {
            Ok(metadata) => {
                let failure = self.failures.remove(index);
                if self.selected >= self.failures.len() {
                    self.selected = 0;
                }
                self.remerge(&failure.item, provider_name, metadata);
                info!(
                    key = %failure.item.key,
                    provider = %provider_name,
                    "Failure resolved via retry"
                );
                self.ctx
                    .progress
                    .item_resolved(&failure.item.key, provider_name);
                Ok(None)
            }
            Err(FetchError::Cancelled) => Err(FetchError::Cancelled),
            Err(FetchError::Provider(error)) => {
                let failure = &mut self.failures[index];
                failure.attempts += 1;
                failure.error = error;
                failure.query = query.to_string();
                Ok(Some(failure.clone()))
            }
        }
    }

    /// Fold a successful retry into the cached record. The retry becomes
    /// primary only when its provider outranks the provider that supplied
    /// the existing record's title.
    fn remerge(&self, item: &MetadataItem, provider: &str, metadata: Metadata) {
        let Some(existing) = self.ctx.cache.get(&item.key) else {
            self.ctx.cache.insert(&item.key, metadata);
            return;
        };

        let existing_primary = existing
            .source_of("title")
            .unwrap_or("local")
            .to_string();
        let existing_priority = self
            .ctx
            .registry
            .priority_of(&existing_primary)
            .unwrap_or(0);
        let retry_priority = self.ctx.registry.priority_of(provider).unwrap_or(0);

        let retry_input = MergeInput {
            provider: provider.to_string(),
            metadata,
        };
        let existing_input = MergeInput {
            provider: existing_primary,
            metadata: (*existing).clone(),
        };

        let inputs = if retry_priority > existing_priority {
            [retry_input, existing_input]
        } else {
            [existing_input, retry_input]
        };
        if let Some(merged) = merge_results(&inputs) {
            self.ctx.cache.replace(&item.key, merged);
        }
    }
}
