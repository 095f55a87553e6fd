//! TMDB (The Movie Database) metadata provider.
//!
//! The primary external catalog: queries the TMDB v3 REST API for movies,
//! shows, seasons, and episodes. Search hits are ranked by token-overlap
//! match scoring with a year-agreement decay; lookups that arrive with a
//! provider-native id skip scoring entirely. An optional on-disk response
//! cache short-circuits repeat requests.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use mediatidy_common::{ErrorCode, FetchError, MediaKind, ProviderError};
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metadata::merge::mark_search_fallback;
use crate::metadata::provider::{
    ConfigField, FieldType, FieldValidation, Provider, ProviderCapabilities, ProviderOptions,
    TemplateVariable,
};
use crate::metadata::types::{FetchRequest, Metadata};

use super::disk_cache::DiskCache;

const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// TMDB API response types (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct MovieHit {
    id: u64,
    title: Option<String>,
    release_date: Option<String>,
    overview: Option<String>,
    vote_average: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TvHit {
    id: u64,
    name: Option<String>,
    first_air_date: Option<String>,
    overview: Option<String>,
    vote_average: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Genre {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MovieDetail {
    id: u64,
    title: Option<String>,
    original_title: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    vote_average: Option<f64>,
    runtime: Option<u32>,
    genres: Option<Vec<Genre>>,
    imdb_id: Option<String>,
    original_language: Option<String>,
    tagline: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    imdb_id: Option<String>,
    tvdb_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TvDetail {
    id: u64,
    name: Option<String>,
    original_name: Option<String>,
    overview: Option<String>,
    first_air_date: Option<String>,
    vote_average: Option<f64>,
    episode_run_time: Option<Vec<u32>>,
    genres: Option<Vec<Genre>>,
    original_language: Option<String>,
    external_ids: Option<ExternalIds>,
}

/// Episode entries are only counted, never read field-by-field.
#[derive(Debug, Deserialize)]
struct SeasonEpisodeSlim {}

#[derive(Debug, Deserialize)]
struct SeasonDetail {
    name: Option<String>,
    overview: Option<String>,
    air_date: Option<String>,
    episodes: Option<Vec<SeasonEpisodeSlim>>,
}

#[derive(Debug, Deserialize)]
struct EpisodeDetail {
    id: Option<u64>,
    name: Option<String>,
    overview: Option<String>,
    air_date: Option<String>,
    vote_average: Option<f64>,
}

// ---------------------------------------------------------------------------
// Provider implementation
// ---------------------------------------------------------------------------

struct TmdbState {
    api_key: String,
    language: String,
    base_url: String,
}

/// TMDB metadata provider.
pub struct TmdbProvider {
    client: reqwest::Client,
    state: RwLock<TmdbState>,
    disk_cache: Option<DiskCache>,
}

impl TmdbProvider {
    /// Create an unconfigured provider; the API key arrives via
    /// [`Provider::configure`]. When `cache_path` is set, responses are
    /// cached in a blob at that path.
    pub fn new(cache_path: Option<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            state: RwLock::new(TmdbState {
                api_key: String::new(),
                language: "en-US".to_string(),
                base_url: TMDB_BASE_URL.to_string(),
            }),
            disk_cache: cache_path.map(DiskCache::load),
        }
    }

    /// Point the provider at a different API root (tests).
    pub fn with_base_url(self, base_url: &str) -> Self {
        self.state.write().base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Similarity between a query and a catalog hit, in `[0, 1]`.
    ///
    /// Titles are folded to lowercase alphanumeric tokens and compared by
    /// Dice overlap, so word order, casing, and scene punctuation do not
    /// matter. Year agreement then scales the title score: an exact premiere
    /// year keeps it whole, off-by-one (regional release dates) costs a
    /// tenth, a clear disagreement halves it (remakes share titles, not
    /// years), and a missing year on either side lands between the two so a
    /// year-confirmed hit always outranks an unconfirmed one. Requests that
    /// carry a provider-native id never reach scoring; those lookups are
    /// trusted outright.
    fn match_score(
        query_title: &str,
        hit_title: &str,
        query_year: Option<u16>,
        hit_year: Option<u16>,
    ) -> f64 {
        let query = title_tokens(query_title);
        let hit = title_tokens(hit_title);
        if query.is_empty() || hit.is_empty() {
            return 0.0;
        }

        let shared = query.intersection(&hit).count();
        let overlap = (2 * shared) as f64 / (query.len() + hit.len()) as f64;

        let year_factor = match (query_year, hit_year) {
            (Some(q), Some(h)) if q == h => 1.0,
            (Some(q), Some(h)) if q.abs_diff(h) == 1 => 0.9,
            (Some(_), Some(_)) => 0.5,
            _ => 0.85,
        };

        overlap * year_factor
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let (url, api_key, language) = {
            let state = self.state.read();
            (
                format!("{}{}", state.base_url, path),
                state.api_key.clone(),
                state.language.clone(),
            )
        };
        debug!(url = %url, "TMDB request");

        let send = self
            .client
            .get(&url)
            .query(&[("api_key", api_key.as_str()), ("language", language.as_str())])
            .query(params)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = send => result
                .map_err(|e| ProviderError::unavailable("tmdb", format!("request failed: {e}")))?,
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::auth_failed("tmdb", "API key rejected").into());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::not_found("tmdb", "no record for request").into());
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            return Err(ProviderError::rate_limited("tmdb", "API returned 429", retry_after).into());
        }
        if status.is_server_error() {
            return Err(ProviderError::unavailable("tmdb", format!("server error: {status}")).into());
        }
        if !status.is_success() {
            return Err(ProviderError::unknown("tmdb", format!("unexpected status: {status}")).into());
        }

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = response.json::<T>() => result
                .map_err(|e| ProviderError::parse_error("tmdb", format!("bad response body: {e}")))?,
        };
        Ok(body)
    }

    fn cache_key(request: &FetchRequest) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            request.media_kind,
            request.name,
            request.year.map(|y| y.to_string()).unwrap_or_default(),
            request.season,
            request.episode,
            request.id.as_deref().unwrap_or_default(),
        )
    }

    async fn fetch_movie(
        &self,
        cancel: &CancellationToken,
        request: &FetchRequest,
    ) -> Result<Metadata, FetchError> {
        if let Some(id) = &request.id {
            return self.movie_detail(cancel, id, 1.0).await;
        }

        let year_param = request.year.map(|y| y.to_string());
        let mut params = vec![("query", request.name.as_str())];
        if let Some(year) = &year_param {
            params.push(("year", year.as_str()));
        }
        let body: SearchResponse<MovieHit> =
            self.get_json(cancel, "/search/movie", &params).await?;

        let top = body
            .results
            .into_iter()
            .map(|hit| {
                let title = hit.title.clone().unwrap_or_default();
                let year = parse_year(hit.release_date.as_deref());
                let score = Self::match_score(&request.name, &title, request.year, year);
                (score, hit)
            })
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .ok_or_else(|| ProviderError::not_found("tmdb", "no movie matches"))?;

        let (score, hit) = top;
        match self.movie_detail(cancel, &hit.id.to_string(), score).await {
            Ok(md) => Ok(md),
            Err(FetchError::Cancelled) => Err(FetchError::Cancelled),
            Err(FetchError::Provider(e)) if e.code != ErrorCode::AuthFailed => {
                // Detail lookup failed; fall back to the search hit.
                debug!(error = %e, "TMDB detail fetch failed, using search result");
                let mut md = Metadata::new(MediaKind::Movie);
                md.core.title = hit.title.unwrap_or_default();
                md.core.year = parse_year(hit.release_date.as_deref());
                md.core.overview = hit.overview.unwrap_or_default();
                md.core.rating = hit.vote_average.unwrap_or(0.0);
                md.ids.insert("tmdb_id".to_string(), hit.id.to_string());
                md.confidence = score.min(1.0);
                md.attribute_core("tmdb");
                mark_search_fallback(&mut md, "tmdb");
                Ok(md)
            }
            Err(e) => Err(e),
        }
    }

    async fn movie_detail(
        &self,
        cancel: &CancellationToken,
        id: &str,
        confidence: f64,
    ) -> Result<Metadata, FetchError> {
        let detail: MovieDetail = self.get_json(cancel, &format!("/movie/{id}"), &[]).await?;

        let mut md = Metadata::new(MediaKind::Movie);
        md.core.title = detail.title.unwrap_or_default();
        md.core.year = parse_year(detail.release_date.as_deref());
        md.core.overview = detail.overview.unwrap_or_default();
        md.core.rating = detail.vote_average.unwrap_or(0.0);
        md.core.genres = detail
            .genres
            .unwrap_or_default()
            .into_iter()
            .map(|g| g.name)
            .collect();
        md.core.language = detail.original_language.unwrap_or_default();
        md.confidence = confidence.min(1.0);
        md.attribute_core("tmdb");

        md.ids.insert("tmdb_id".to_string(), detail.id.to_string());
        if let Some(imdb) = detail.imdb_id {
            if !imdb.is_empty() {
                md.ids.insert("imdb_id".to_string(), imdb);
            }
        }
        if let Some(date) = detail.release_date {
            if !date.is_empty() {
                md.set_extended("premiere_date", json!(date), "tmdb");
            }
        }
        if let Some(runtime) = detail.runtime {
            md.set_extended("runtime_minutes", json!(runtime), "tmdb");
        }
        if let Some(original) = detail.original_title {
            if original != md.core.title {
                md.set_extended("original_title", json!(original), "tmdb");
            }
        }
        if let Some(tagline) = detail.tagline {
            if !tagline.is_empty() {
                md.set_extended("tagline", json!(tagline), "tmdb");
            }
        }
        Ok(md)
    }

    async fn fetch_show(
        &self,
        cancel: &CancellationToken,
        request: &FetchRequest,
    ) -> Result<Metadata, FetchError> {
        let id = match &request.id {
            Some(id) => id.clone(),
            None => self.search_show_id(cancel, request).await?,
        };

        let detail: TvDetail = self
            .get_json(
                cancel,
                &format!("/tv/{id}"),
                &[("append_to_response", "external_ids")],
            )
            .await?;

        let mut md = Metadata::new(MediaKind::Show);
        md.core.title = detail.name.unwrap_or_default();
        md.core.year = parse_year(detail.first_air_date.as_deref());
        md.core.overview = detail.overview.unwrap_or_default();
        md.core.rating = detail.vote_average.unwrap_or(0.0);
        md.core.genres = detail
            .genres
            .unwrap_or_default()
            .into_iter()
            .map(|g| g.name)
            .collect();
        md.core.language = detail.original_language.unwrap_or_default();
        md.confidence = Self::match_score(&request.name, &md.core.title, request.year, md.core.year)
            .clamp(0.5, 1.0);
        md.attribute_core("tmdb");

        md.ids.insert("tmdb_id".to_string(), detail.id.to_string());
        if let Some(ext) = detail.external_ids {
            if let Some(imdb) = ext.imdb_id {
                if !imdb.is_empty() {
                    md.ids.insert("imdb_id".to_string(), imdb);
                }
            }
            if let Some(tvdb) = ext.tvdb_id {
                md.ids.insert("tvdb_id".to_string(), tvdb.to_string());
            }
        }
        if let Some(date) = detail.first_air_date {
            if !date.is_empty() {
                md.set_extended("premiere_date", json!(date), "tmdb");
            }
        }
        if let Some(runtime) = detail.episode_run_time.as_ref().and_then(|v| v.first()) {
            md.set_extended("runtime_minutes", json!(runtime), "tmdb");
        }
        Ok(md)
    }

    async fn search_show_id(
        &self,
        cancel: &CancellationToken,
        request: &FetchRequest,
    ) -> Result<String, FetchError> {
        let body: SearchResponse<TvHit> = self
            .get_json(cancel, "/search/tv", &[("query", request.name.as_str())])
            .await?;

        body.results
            .into_iter()
            .map(|hit| {
                let title = hit.name.clone().unwrap_or_default();
                let year = parse_year(hit.first_air_date.as_deref());
                let score = Self::match_score(&request.name, &title, request.year, year);
                (score, hit.id)
            })
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, id)| id.to_string())
            .ok_or_else(|| ProviderError::not_found("tmdb", "no show matches").into())
    }

    async fn fetch_season(
        &self,
        cancel: &CancellationToken,
        request: &FetchRequest,
    ) -> Result<Metadata, FetchError> {
        let id = match &request.id {
            Some(id) => id.clone(),
            None => self.search_show_id(cancel, request).await?,
        };
        let detail: SeasonDetail = self
            .get_json(cancel, &format!("/tv/{id}/season/{}", request.season), &[])
            .await?;

        let mut md = Metadata::new(MediaKind::Season);
        md.core.title = request.name.clone();
        md.core.year = request.year.or(parse_year(detail.air_date.as_deref()));
        md.core.season_number = request.season;
        md.core.overview = detail.overview.unwrap_or_default();
        md.confidence = 0.9;
        md.attribute_core("tmdb");

        md.ids.insert("tmdb_id".to_string(), id);
        if let Some(name) = detail.name {
            if !name.is_empty() {
                md.set_extended("season_name", json!(name), "tmdb");
            }
        }
        if let Some(date) = detail.air_date {
            if !date.is_empty() {
                md.set_extended("air_date", json!(date), "tmdb");
            }
        }
        if let Some(episodes) = detail.episodes {
            md.set_extended("episode_count", json!(episodes.len()), "tmdb");
        }
        Ok(md)
    }

    async fn fetch_episode(
        &self,
        cancel: &CancellationToken,
        request: &FetchRequest,
    ) -> Result<Metadata, FetchError> {
        let id = match &request.id {
            Some(id) => id.clone(),
            None => self.search_show_id(cancel, request).await?,
        };
        let detail: EpisodeDetail = self
            .get_json(
                cancel,
                &format!(
                    "/tv/{id}/season/{}/episode/{}",
                    request.season, request.episode
                ),
                &[],
            )
            .await?;

        let mut md = Metadata::new(MediaKind::Episode);
        md.core.title = request.name.clone();
        md.core.year = request.year;
        md.core.season_number = request.season;
        md.core.episode_number = request.episode;
        md.core.episode_name = detail.name.unwrap_or_default();
        md.core.overview = detail.overview.unwrap_or_default();
        md.core.rating = detail.vote_average.unwrap_or(0.0);
        md.confidence = 0.9;
        md.attribute_core("tmdb");

        md.ids.insert("tmdb_id".to_string(), id);
        if let Some(episode_id) = detail.id {
            md.ids
                .insert("tmdb_episode".to_string(), episode_id.to_string());
        }
        if let Some(date) = detail.air_date {
            if !date.is_empty() {
                md.set_extended("air_date", json!(date), "tmdb");
            }
        }
        Ok(md)
    }
}

/// Lowercase alphanumeric tokens of a title, deduplicated.
fn title_tokens(title: &str) -> std::collections::BTreeSet<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extract a four-digit year from a date string like `"2023-04-15"`.
fn parse_year(date: Option<&str>) -> Option<u16> {
    date.and_then(|d| d.get(..4)).and_then(|y| y.parse().ok())
}

#[async_trait]
impl Provider for TmdbProvider {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    fn description(&self) -> &'static str {
        "The Movie Database (TMDB) catalog"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            media_kinds: vec![
                MediaKind::Movie,
                MediaKind::Show,
                MediaKind::Season,
                MediaKind::Episode,
            ],
            requires_auth: true,
            priority: 100,
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
                "Canonical title from the catalog",
                &all,
                "Breaking Bad",
                "basic",
                "string",
            ),
            TemplateVariable::new(
                "year",
                "Year",
                "First release or air year",
                &all,
                "2008",
                "basic",
                "number",
            ),
            TemplateVariable::new(
                "rating",
                "Rating",
                "Community vote average (0-10)",
                &all,
                "8.9",
                "details",
                "number",
            ),
            TemplateVariable::new(
                "genres",
                "Genres",
                "Genre labels in catalog order",
                &all,
                "Crime, Drama",
                "details",
                "list",
            ),
            TemplateVariable::new(
                "episode_title",
                "Episode Title",
                "Name of the episode",
                &[MediaKind::Episode],
                "Ozymandias",
                "episode",
                "string",
            ),
        ]
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField {
                name: "api_key".to_string(),
                display_name: "API Key".to_string(),
                field_type: FieldType::Password,
                required: true,
                default: None,
                description: "TMDB v3 API key".to_string(),
                sensitive: true,
                validation: Some(FieldValidation {
                    min_length: Some(8),
                    ..FieldValidation::default()
                }),
            },
            ConfigField {
                name: "language".to_string(),
                display_name: "Language".to_string(),
                field_type: FieldType::String,
                required: false,
                default: Some(json!("en-US")),
                description: "Preferred metadata language (ISO tag)".to_string(),
                sensitive: false,
                validation: None,
            },
        ]
    }

    fn configure(&self, options: &ProviderOptions) -> Result<(), ProviderError> {
        let api_key = options
            .get("api_key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::invalid_request("tmdb", "api_key is required"))?;

        let mut state = self.state.write();
        state.api_key = api_key.to_string();
        if let Some(language) = options.get("language").and_then(|v| v.as_str()) {
            state.language = language.to_string();
        }
        Ok(())
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        request: &FetchRequest,
    ) -> Result<Metadata, FetchError> {
        if self.state.read().api_key.is_empty() {
            return Err(ProviderError::auth_failed("tmdb", "provider not configured").into());
        }
        if request.name.is_empty() && request.id.is_none() {
            return Err(
                ProviderError::invalid_request("tmdb", "request needs a name or an id").into(),
            );
        }

        let cache_key = Self::cache_key(request);
        if let Some(cache) = &self.disk_cache {
            if let Some(hit) = cache.get(&cache_key) {
                return Ok(hit);
            }
        }

        let result = match request.media_kind {
            MediaKind::Movie => self.fetch_movie(cancel, request).await,
            MediaKind::Show => self.fetch_show(cancel, request).await,
            MediaKind::Season => self.fetch_season(cancel, request).await,
            MediaKind::Episode => self.fetch_episode(cancel, request).await,
            MediaKind::Unknown => Err(ProviderError::unsupported_media_type(
                "tmdb",
                "unknown media kind",
            )
            .into()),
        }?;

        if let Some(cache) = &self.disk_cache {
            cache.put(&cache_key, &result);
        }
        Ok(result)
    }

    fn save_cache(&self) -> Result<(), ProviderError> {
        match &self.disk_cache {
            Some(cache) => cache.save("tmdb"),
            None => Ok(()),
        }
    }
}
