//! Combines records from multiple providers into one metadata record.
//!
//! The first input is the primary; the rest are secondaries in declared
//! priority order. The merger never mutates its inputs.

use serde_json::Value;

use super::types::Metadata;

/// Extended-field marker a provider sets when it could only return a search
/// result rather than a full record. The merger caps confidence accordingly
/// and strips the marker from its output.
pub const SEARCH_FALLBACK_KEY: &str = "search_fallback";

/// One provider's contribution to a merge.
#[derive(Debug, Clone)]
pub struct MergeInput {
    /// Provider that produced the record.
    pub provider: String,
    pub metadata: Metadata,
}

/// Mark a record as a search-result fallback.
pub fn mark_search_fallback(metadata: &mut Metadata, provider: &str) {
    metadata.set_extended(SEARCH_FALLBACK_KEY, Value::Bool(true), provider);
}

fn is_search_fallback(metadata: &Metadata) -> bool {
    metadata
        .extended
        .get(SEARCH_FALLBACK_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Merge provider records in priority order into a single record.
///
/// - Core fields: primary where set; blanks filled from secondaries in order.
///   Numeric zeros and empty strings count as unset.
/// - Extended: union; primary wins key conflicts.
/// - Sources: every written field records the provider that supplied it.
/// - IDs: union; on conflict the primary's value wins and the secondary's is
///   preserved under `<provider>_id`.
/// - Confidence: max of inputs when the primary is a full record;
///   `min(primary, 0.8)` when the primary was a search-result fallback.
///
/// Returns `None` when no inputs were given.
pub fn merge_results(inputs: &[MergeInput]) -> Option<Metadata> {
    let (first, rest) = inputs.split_first()?;

    let primary_from_search = is_search_fallback(&first.metadata);
    let mut merged = first.metadata.clone();
    merged.extended.remove(SEARCH_FALLBACK_KEY);
    merged.sources.remove(SEARCH_FALLBACK_KEY);

    for input in rest {
        fill_core(&mut merged, input);
        fill_extended(&mut merged, input);
        fill_ids(&mut merged, input);
    }

    merged.confidence = if primary_from_search {
        first.metadata.confidence.min(0.8)
    } else {
        inputs
            .iter()
            .map(|i| i.metadata.confidence)
            .fold(first.metadata.confidence, f64::max)
    };

    Some(merged)
}

fn source_for(input: &MergeInput, field: &str) -> String {
    input
        .metadata
        .source_of(field)
        .unwrap_or(&input.provider)
        .to_string()
}

fn fill_core(merged: &mut Metadata, input: &MergeInput) {
    let other = &input.metadata.core;

    if merged.core.title.is_empty() && !other.title.is_empty() {
        merged.core.title = other.title.clone();
        merged
            .sources
            .insert("title".to_string(), source_for(input, "title"));
    }
    if merged.core.year.is_none() && other.year.is_some() {
        merged.core.year = other.year;
        merged
            .sources
            .insert("year".to_string(), source_for(input, "year"));
    }
    if merged.core.media_kind == mediatidy_common::MediaKind::Unknown
        && other.media_kind != mediatidy_common::MediaKind::Unknown
    {
        merged.core.media_kind = other.media_kind;
        merged
            .sources
            .insert("media_kind".to_string(), source_for(input, "media_kind"));
    }
    if merged.core.season_number == 0 && other.season_number != 0 {
        merged.core.season_number = other.season_number;
        merged.sources.insert(
            "season_number".to_string(),
            source_for(input, "season_number"),
        );
    }
    if merged.core.episode_name.is_empty() && !other.episode_name.is_empty() {
        merged.core.episode_name = other.episode_name.clone();
        merged.sources.insert(
            "episode_name".to_string(),
            source_for(input, "episode_name"),
        );
    }
    if merged.core.episode_number == 0 && other.episode_number != 0 {
        merged.core.episode_number = other.episode_number;
        merged.sources.insert(
            "episode_number".to_string(),
            source_for(input, "episode_number"),
        );
    }
    if merged.core.overview.is_empty() && !other.overview.is_empty() {
        merged.core.overview = other.overview.clone();
        merged
            .sources
            .insert("overview".to_string(), source_for(input, "overview"));
    }
    if merged.core.rating == 0.0 && other.rating != 0.0 {
        merged.core.rating = other.rating;
        merged
            .sources
            .insert("rating".to_string(), source_for(input, "rating"));
    }
    if merged.core.genres.is_empty() && !other.genres.is_empty() {
        merged.core.genres = other.genres.clone();
        merged
            .sources
            .insert("genres".to_string(), source_for(input, "genres"));
    }
    if merged.core.language.is_empty() && !other.language.is_empty() {
        merged.core.language = other.language.clone();
        merged
            .sources
            .insert("language".to_string(), source_for(input, "language"));
    }
    if merged.core.country.is_empty() && !other.country.is_empty() {
        merged.core.country = other.country.clone();
        merged
            .sources
            .insert("country".to_string(), source_for(input, "country"));
    }
}

fn fill_extended(merged: &mut Metadata, input: &MergeInput) {
    for (key, value) in &input.metadata.extended {
        if key == SEARCH_FALLBACK_KEY || merged.extended.contains_key(key) {
            continue;
        }
        merged.extended.insert(key.clone(), value.clone());
        merged.sources.insert(key.clone(), source_for(input, key));
    }
}

fn fill_ids(merged: &mut Metadata, input: &MergeInput) {
    for (kind, value) in &input.metadata.ids {
        match merged.ids.get(kind) {
            None => {
                merged.ids.insert(kind.clone(), value.clone());
            }
            Some(existing) if existing != value => {
                merged
                    .ids
                    .insert(format!("{}_id", input.provider), value.clone());
            }
            _ => {}
        }
    }
}
