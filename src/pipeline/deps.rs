//! Dependency-aware request preparation.
//!
//! Season and episode lookups against an external catalog need their show's
//! metadata first: the show record supplies the provider-native identifier
//! and the canonical name/year the child request is rewritten with. Thanks to
//! the phase barrier the show is almost always a cache hit; the cold path
//! fetches it through the same rate limiter (singleflight, no negative
//! caching).

use mediatidy_common::{fingerprint, FetchError, MediaKind};
use serde_json::json;

use crate::metadata::provider::Provider;
use crate::metadata::types::{FetchRequest, MetadataItem};

use super::EnrichCtx;

/// Build the provider request for one item, resolving the show dependency
/// when the provider needs it.
///
/// Errors (including `RATE_LIMITED`, so backpressure is honored) abort only
/// this provider's fetch for this item.
pub(crate) async fn prepare_request(
    ctx: &EnrichCtx,
    provider_name: &str,
    provider: &dyn Provider,
    item: &MetadataItem,
) -> Result<FetchRequest, FetchError> {
    let mut request = FetchRequest {
        media_kind: item.media_kind,
        name: item.name.clone(),
        year: item.year,
        season: item.season,
        episode: item.episode,
        id: None,
        language: ctx.language.clone(),
        extra: Default::default(),
    };
    if let Some(path) = &item.node_path {
        request
            .extra
            .insert("path".to_string(), json!(path.to_string_lossy()));
    }

    let caps = provider.capabilities();
    let needs_parent = matches!(item.media_kind, MediaKind::Season | MediaKind::Episode)
        && caps.requires_auth
        && caps.supports(MediaKind::Show);
    if !needs_parent {
        return Ok(request);
    }

    let show_key = fingerprint(MediaKind::Show, &item.name, item.year, 0, 0);
    let show = ctx
        .cache
        .get_or_fetch(&show_key, || async {
            ctx.limiters.acquire(provider_name, &ctx.cancel).await?;
            let show_request =
                FetchRequest::show_lookup(&item.name, item.year, ctx.language.clone());
            provider.fetch(&ctx.cancel, &show_request).await
        })
        .await?;

    if let Some(id) = show.preferred_id() {
        request.id = Some(id.to_string());
    }
    // Carry the show's canonical identity into the child request.
    if !show.core.title.is_empty() {
        request.name = show.core.title.clone();
    }
    if show.core.year.is_some() {
        request.year = show.core.year;
    }
    Ok(request)
}
