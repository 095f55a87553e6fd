//! Zero-auth provider deriving metadata purely from names.
//!
//! The local provider is the floor of the merge order: it always produces a
//! record, so every item ends up with at least a parsed title, year, and
//! season/episode numbers even when no external catalog is configured.

use async_trait::async_trait;
use mediatidy_common::{FetchError, MediaKind, ProviderError};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::metadata::provider::{
    ConfigField, Provider, ProviderCapabilities, ProviderOptions, TemplateVariable,
};
use crate::metadata::types::{FetchRequest, Metadata};

/// Metadata provider backed by `mediatidy-parser`.
#[derive(Debug, Default)]
pub struct LocalProvider;

impl LocalProvider {
    /// Create the provider.
    pub fn new() -> Self {
        Self
    }

    fn confidence(has_title: bool, has_year: bool) -> f64 {
        match (has_title, has_year) {
            (true, true) => 0.9,
            (true, false) => 0.8,
            _ => 0.5,
        }
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    fn description(&self) -> &'static str {
        "Derives metadata from file and folder names"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            media_kinds: vec![
                MediaKind::Movie,
                MediaKind::Show,
                MediaKind::Season,
                MediaKind::Episode,
            ],
            requires_auth: false,
            priority: 0,
        }
    }

    fn supported_variables(&self) -> Vec<TemplateVariable> {
        let all = [
            MediaKind::Movie,
            MediaKind::Show,
            MediaKind::Season,
            MediaKind::Episode,
        ];
        vec![
            TemplateVariable::new(
                "title",
                "Title",
                "Clean title parsed from the name",
                &all,
                "Breaking Bad",
                "basic",
                "string",
            ),
            TemplateVariable::new(
                "year",
                "Year",
                "Release year parsed from the name",
                &all,
                "2008",
                "basic",
                "number",
            ),
            TemplateVariable::new(
                "season",
                "Season",
                "Season number (0 for specials)",
                &[MediaKind::Season, MediaKind::Episode],
                "1",
                "episode",
                "number",
            ),
            TemplateVariable::new(
                "episode",
                "Episode",
                "Episode number within the season",
                &[MediaKind::Episode],
                "5",
                "episode",
                "number",
            ),
        ]
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        Vec::new()
    }

    fn configure(&self, _options: &ProviderOptions) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        request: &FetchRequest,
    ) -> Result<Metadata, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if request.name.is_empty() {
            return Err(
                ProviderError::invalid_request("local", "request has no name to parse").into(),
            );
        }

        let parsed = mediatidy_parser::parse(&request.name);

        let mut md = Metadata::new(request.media_kind);
        md.core.title = if parsed.title.is_empty() {
            request.name.clone()
        } else {
            parsed.title
        };
        md.core.year = request.year.or(parsed.year);
        md.core.season_number = match request.season {
            0 => parsed.season.unwrap_or(0),
            n => n,
        };
        md.core.episode_number = match request.episode {
            0 => parsed.episode.unwrap_or(0),
            n => n,
        };
        if request.media_kind == MediaKind::Episode && md.core.episode_number != 0 {
            md.core.episode_name = format!("Episode {}", md.core.episode_number);
        }
        if let Some(language) = &request.language {
            md.core.language = language.clone();
        }
        md.confidence = Self::confidence(!md.core.title.is_empty(), md.core.year.is_some());
        md.attribute_core("local");

        if let Some(path) = request.extra_str("path") {
            md.set_extended("source_path", json!(path), "local");
        }

        Ok(md)
    }
}
