//! Shared data types for metadata requests and records.

use std::collections::HashMap;

use mediatidy_common::MediaKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single metadata lookup handed to a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchRequest {
    pub media_kind: MediaKind,
    /// Title to look up.
    pub name: String,
    /// Release year, when known.
    pub year: Option<u16>,
    /// Season number; 0 outside season/episode lookups.
    pub season: u16,
    /// Episode number; 0 outside episode lookups.
    pub episode: u16,
    /// Provider-native identifier carried over from a parent lookup.
    pub id: Option<String>,
    /// Preferred metadata language.
    pub language: Option<String>,
    /// Provider-specific hints (e.g. `path` for the technical probe).
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

impl FetchRequest {
    /// Request for a show lookup, as issued by the dependency resolver.
    pub fn show_lookup(name: &str, year: Option<u16>, language: Option<String>) -> Self {
        Self {
            media_kind: MediaKind::Show,
            name: name.to_string(),
            year,
            language,
            ..Self::default()
        }
    }

    /// String-typed hint from `extra`, if present.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// The universally understood core of a metadata record.
///
/// Empty strings and numeric zeros count as "unset" for merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreMetadata {
    pub title: String,
    pub year: Option<u16>,
    pub media_kind: MediaKind,
    pub season_number: u16,
    pub episode_name: String,
    pub episode_number: u16,
    pub overview: String,
    pub rating: f64,
    pub genres: Vec<String>,
    pub language: String,
    pub country: String,
}

impl CoreMetadata {
    /// Names of the core fields that currently hold a value.
    pub fn populated_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if !self.title.is_empty() {
            fields.push("title");
        }
        if self.year.is_some() {
            fields.push("year");
        }
        if self.media_kind != MediaKind::Unknown {
            fields.push("media_kind");
        }
        if self.season_number != 0 {
            fields.push("season_number");
        }
        if !self.episode_name.is_empty() {
            fields.push("episode_name");
        }
        if self.episode_number != 0 {
            fields.push("episode_number");
        }
        if !self.overview.is_empty() {
            fields.push("overview");
        }
        if self.rating != 0.0 {
            fields.push("rating");
        }
        if !self.genres.is_empty() {
            fields.push("genres");
        }
        if !self.language.is_empty() {
            fields.push("language");
        }
        if !self.country.is_empty() {
            fields.push("country");
        }
        fields
    }
}

/// A complete metadata record as published to the cache.
///
/// Invariant: every populated core or extended field has a `sources` entry
/// naming the provider that supplied it. Use [`Metadata::attribute_core`] and
/// [`Metadata::set_extended`] so the invariant holds by construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub core: CoreMetadata,
    /// Provider-specific fields outside the core schema.
    #[serde(default)]
    pub extended: HashMap<String, Value>,
    /// Field name to the provider that supplied it.
    #[serde(default)]
    pub sources: HashMap<String, String>,
    /// External identifiers keyed by id kind (`tmdb_id`, `imdb_id`, ...).
    #[serde(default)]
    pub ids: HashMap<String, String>,
    /// Match confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Id kinds consulted, in order, when a child lookup needs its show's
/// provider-native identifier.
pub const PREFERRED_ID_KINDS: [&str; 4] = ["tmdb_id", "imdb_id", "omdb_id", "series_id"];

impl Metadata {
    /// Empty record of the given kind. `media_kind` is not attributed until a
    /// provider claims the record via [`attribute_core`](Self::attribute_core).
    pub fn new(kind: MediaKind) -> Self {
        Self {
            core: CoreMetadata {
                media_kind: kind,
                ..CoreMetadata::default()
            },
            ..Self::default()
        }
    }

    /// Record `provider` as the source of every currently populated core
    /// field that has no source yet.
    pub fn attribute_core(&mut self, provider: &str) {
        for field in self.core.populated_fields() {
            self.sources
                .entry(field.to_string())
                .or_insert_with(|| provider.to_string());
        }
    }

    /// Set an extended field and record its source in one step.
    pub fn set_extended(&mut self, field: &str, value: Value, provider: &str) {
        self.extended.insert(field.to_string(), value);
        self.sources
            .insert(field.to_string(), provider.to_string());
    }

    /// Provider that supplied `field`, if recorded.
    pub fn source_of(&self, field: &str) -> Option<&str> {
        self.sources.get(field).map(String::as_str)
    }

    /// First non-empty id among the preferred kinds, used for identity
    /// carryover from shows to their seasons and episodes.
    pub fn preferred_id(&self) -> Option<&str> {
        PREFERRED_ID_KINDS
            .iter()
            .filter_map(|kind| self.ids.get(*kind))
            .map(String::as_str)
            .find(|id| !id.is_empty())
    }
}

/// The unit of work flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataItem {
    /// Canonical fingerprint; empty for unknown media kinds (uncacheable).
    pub key: String,
    /// Title used for lookups.
    pub name: String,
    pub year: Option<u16>,
    pub season: u16,
    pub episode: u16,
    pub media_kind: MediaKind,
    pub phase: mediatidy_common::Phase,
    /// Path of the underlying tree node, when it has one.
    pub node_path: Option<std::path::PathBuf>,
}

impl MetadataItem {
    /// Short human-readable descriptor for progress messages.
    pub fn descriptor(&self) -> String {
        match self.media_kind {
            MediaKind::Season => format!("{} Season {}", self.name, self.season),
            MediaKind::Episode => {
                format!("{} S{:02}E{:02}", self.name, self.season, self.episode)
            }
            _ => match self.year {
                Some(year) => format!("{} ({})", self.name, year),
                None => self.name.clone(),
            },
        }
    }
}

/// A provider's recorded failure for one item, carried into retry mode.
#[derive(Debug, Clone)]
pub struct MetadataFailure {
    pub item: MetadataItem,
    /// Provider that failed.
    pub provider: String,
    /// The search query that was used.
    pub query: String,
    /// Number of attempts so far, at least 1.
    pub attempts: u32,
    pub error: mediatidy_common::ProviderError,
    /// Set when the user skipped this failure in retry mode.
    pub dismissed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_core_covers_populated_fields() {
        let mut md = Metadata::new(MediaKind::Movie);
        md.core.title = "Avatar".to_string();
        md.core.year = Some(2009);
        md.core.rating = 7.8;
        md.attribute_core("tmdb");

        assert_eq!(md.source_of("title"), Some("tmdb"));
        assert_eq!(md.source_of("year"), Some("tmdb"));
        assert_eq!(md.source_of("rating"), Some("tmdb"));
        assert_eq!(md.source_of("media_kind"), Some("tmdb"));
        assert_eq!(md.source_of("overview"), None);
    }

    #[test]
    fn attribute_core_keeps_existing_sources() {
        let mut md = Metadata::new(MediaKind::Movie);
        md.core.title = "Avatar".to_string();
        md.attribute_core("tmdb");
        md.attribute_core("omdb");
        assert_eq!(md.source_of("title"), Some("tmdb"));
    }

    #[test]
    fn set_extended_records_source() {
        let mut md = Metadata::new(MediaKind::Movie);
        md.set_extended("video_codec", "hevc".into(), "ffprobe");
        assert_eq!(md.extended["video_codec"], "hevc");
        assert_eq!(md.source_of("video_codec"), Some("ffprobe"));
    }

    #[test]
    fn preferred_id_order() {
        let mut md = Metadata::new(MediaKind::Show);
        md.ids.insert("omdb_id".to_string(), "o-1".to_string());
        md.ids.insert("imdb_id".to_string(), "tt42".to_string());
        assert_eq!(md.preferred_id(), Some("tt42"));

        md.ids.insert("tmdb_id".to_string(), "99".to_string());
        assert_eq!(md.preferred_id(), Some("99"));

        md.ids.insert("tmdb_id".to_string(), String::new());
        // Empty values are skipped.
        assert_eq!(md.preferred_id(), Some("tt42"));
    }

    #[test]
    fn item_descriptors() {
        let mut item = MetadataItem {
            key: "movie:Avatar:2009".to_string(),
            name: "Avatar".to_string(),
            year: Some(2009),
            season: 0,
            episode: 0,
            media_kind: MediaKind::Movie,
            phase: mediatidy_common::Phase::ShowsAndMovies,
            node_path: None,
        };
        assert_eq!(item.descriptor(), "Avatar (2009)");

        item.media_kind = MediaKind::Episode;
        item.season = 1;
        item.episode = 5;
        assert_eq!(item.descriptor(), "Avatar S01E05");
    }

    #[test]
    fn unset_core_fields_are_not_populated() {
        let core = CoreMetadata::default();
        assert!(core.populated_fields().is_empty());
    }
}
