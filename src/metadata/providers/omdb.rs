//! OMDb (Open Movie Database) metadata provider.
//!
//! Secondary external catalog. OMDb keys everything off titles and IMDb ids
//! and reports failures inside a 200 response (`Response: "False"`), so the
//! error mapping inspects the body rather than the status line.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use mediatidy_common::{FetchError, MediaKind, ProviderError};
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metadata::provider::{
    ConfigField, FieldType, FieldValidation, Provider, ProviderCapabilities, ProviderOptions,
    TemplateVariable,
};
use crate::metadata::types::{FetchRequest, Metadata};

use super::disk_cache::DiskCache;

const OMDB_BASE_URL: &str = "https://www.omdbapi.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct OmdbRecord {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Error")]
    error: Option<String>,

    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "Year")]
    year: Option<String>,
    #[serde(rename = "Plot")]
    plot: Option<String>,
    #[serde(rename = "Genre")]
    genre: Option<String>,
    #[serde(rename = "Language")]
    language: Option<String>,
    #[serde(rename = "Country")]
    country: Option<String>,
    #[serde(rename = "Rated")]
    rated: Option<String>,
    #[serde(rename = "Released")]
    released: Option<String>,
    #[serde(rename = "Runtime")]
    runtime: Option<String>,
    #[serde(rename = "Awards")]
    awards: Option<String>,
    #[serde(rename = "imdbRating")]
    imdb_rating: Option<String>,
    #[serde(rename = "imdbID")]
    imdb_id: Option<String>,
}

struct OmdbState {
    api_key: String,
    base_url: String,
}

/// OMDb metadata provider.
pub struct OmdbProvider {
    client: reqwest::Client,
    state: RwLock<OmdbState>,
    disk_cache: Option<DiskCache>,
}

impl OmdbProvider {
    /// Create an unconfigured provider; the API key arrives via
    /// [`Provider::configure`].
    pub fn new(cache_path: Option<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            state: RwLock::new(OmdbState {
                api_key: String::new(),
                base_url: OMDB_BASE_URL.to_string(),
            }),
            disk_cache: cache_path.map(DiskCache::load),
        }
    }

    /// Point the provider at a different API root (tests).
    pub fn with_base_url(self, base_url: &str) -> Self {
        self.state.write().base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn get_record(
        &self,
        cancel: &CancellationToken,
        params: Vec<(String, String)>,
    ) -> Result<OmdbRecord, FetchError> {
        let (url, api_key) = {
            let state = self.state.read();
            (state.base_url.clone(), state.api_key.clone())
        };
        debug!(url = %url, "OMDb request");

        let send = self
            .client
            .get(format!("{url}/"))
            .query(&[("apikey", api_key.as_str())])
            .query(&params)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = send => result
                .map_err(|e| ProviderError::unavailable("omdb", format!("request failed: {e}")))?,
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::auth_failed("omdb", "API key rejected").into());
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::rate_limited("omdb", "request limit reached", 0).into());
        }
        if status.is_server_error() {
            return Err(ProviderError::unavailable("omdb", format!("server error: {status}")).into());
        }
        if !status.is_success() {
            return Err(ProviderError::unknown("omdb", format!("unexpected status: {status}")).into());
        }

        let record = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = response.json::<OmdbRecord>() => result
                .map_err(|e| ProviderError::parse_error("omdb", format!("bad response body: {e}")))?,
        };

        if record.response.eq_ignore_ascii_case("false") {
            let message = record.error.unwrap_or_else(|| "request refused".to_string());
            let lowered = message.to_ascii_lowercase();
            let err = if lowered.contains("not found") {
                ProviderError::not_found("omdb", message)
            } else if lowered.contains("api key") {
                ProviderError::auth_failed("omdb", message)
            } else if lowered.contains("limit") {
                ProviderError::rate_limited("omdb", message, 0)
            } else {
                ProviderError::unknown("omdb", message)
            };
            return Err(err.into());
        }
        Ok(record)
    }

    fn params_for(request: &FetchRequest) -> Result<Vec<(String, String)>, ProviderError> {
        let mut params: Vec<(String, String)> = Vec::new();
        match &request.id {
            // IMDb ids carried over from the show lookup go through `i`.
            Some(id) if id.starts_with("tt") => params.push(("i".to_string(), id.clone())),
            _ => params.push(("t".to_string(), request.name.clone())),
        }

        match request.media_kind {
            MediaKind::Movie => {
                params.push(("type".to_string(), "movie".to_string()));
                if let Some(year) = request.year {
                    params.push(("y".to_string(), year.to_string()));
                }
            }
            MediaKind::Show => {
                params.push(("type".to_string(), "series".to_string()));
            }
            MediaKind::Season => {
                params.push(("Season".to_string(), request.season.to_string()));
            }
            MediaKind::Episode => {
                params.push(("Season".to_string(), request.season.to_string()));
                params.push(("Episode".to_string(), request.episode.to_string()));
            }
            MediaKind::Unknown => {
                return Err(ProviderError::unsupported_media_type(
                    "omdb",
                    "unknown media kind",
                ));
            }
        }
        Ok(params)
    }

    fn record_to_metadata(&self, request: &FetchRequest, record: OmdbRecord) -> Metadata {
        let mut md = Metadata::new(request.media_kind);
        md.core.title = match request.media_kind {
            // Season/episode records keep the show title for fingerprinting;
            // the record's own title becomes the episode name.
            MediaKind::Season | MediaKind::Episode => request.name.clone(),
            _ => record.title.clone().unwrap_or_default(),
        };
        if request.media_kind == MediaKind::Episode {
            md.core.episode_name = record.title.clone().unwrap_or_default();
            md.core.episode_number = request.episode;
        }
        if request.media_kind == MediaKind::Season || request.media_kind == MediaKind::Episode {
            md.core.season_number = request.season;
        }
        md.core.year = request
            .year
            .or_else(|| first_year(record.year.as_deref()));
        md.core.overview = record
            .plot
            .filter(|p| !p.eq_ignore_ascii_case("n/a"))
            .unwrap_or_default();
        md.core.rating = record
            .imdb_rating
            .as_deref()
            .and_then(|r| r.parse::<f64>().ok())
            .unwrap_or(0.0);
        md.core.genres = record
            .genre
            .filter(|g| !g.eq_ignore_ascii_case("n/a"))
            .map(|g| g.split(", ").map(str::to_string).collect())
            .unwrap_or_default();
        md.core.language = record
            .language
            .and_then(|l| l.split(", ").next().map(str::to_string))
            .filter(|l| !l.eq_ignore_ascii_case("n/a"))
            .unwrap_or_default();
        md.core.country = record
            .country
            .and_then(|c| c.split(", ").next().map(str::to_string))
            .filter(|c| !c.eq_ignore_ascii_case("n/a"))
            .unwrap_or_default();

        let exact_title = record
            .title
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(&request.name));
        md.confidence = if request.id.is_some() {
            0.95
        } else if exact_title {
            0.85
        } else {
            0.6
        };
        md.attribute_core("omdb");

        if let Some(imdb) = record.imdb_id.filter(|id| !id.is_empty()) {
            md.ids.insert("imdb_id".to_string(), imdb);
        }
        for (field, value) in [
            ("rated", record.rated),
            ("released", record.released),
            ("runtime", record.runtime),
            ("awards", record.awards),
        ] {
            if let Some(value) = value.filter(|v| !v.eq_ignore_ascii_case("n/a")) {
                md.set_extended(field, json!(value), "omdb");
            }
        }
        md
    }
}

/// First four-digit year in an OMDb year string (`"2008"`, `"2008–2013"`).
fn first_year(raw: Option<&str>) -> Option<u16> {
    let raw = raw?;
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() == 4 {
        digits.parse().ok()
    } else {
        None
    }
}

#[async_trait]
impl Provider for OmdbProvider {
    fn name(&self) -> &'static str {
        "omdb"
    }

    fn description(&self) -> &'static str {
        "The Open Movie Database (OMDb) catalog"
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
            priority: 80,
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
                "The Matrix",
                "basic",
                "string",
            ),
            TemplateVariable::new(
                "rated",
                "Rated",
                "Content rating (MPAA style)",
                &[MediaKind::Movie, MediaKind::Show],
                "R",
                "details",
                "string",
            ),
            TemplateVariable::new(
                "awards",
                "Awards",
                "Awards summary line",
                &[MediaKind::Movie, MediaKind::Show],
                "Won 4 Oscars.",
                "details",
                "string",
            ),
        ]
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![ConfigField {
            name: "api_key".to_string(),
            display_name: "API Key".to_string(),
            field_type: FieldType::Password,
            required: true,
            default: None,
            description: "OMDb API key".to_string(),
            sensitive: true,
            validation: Some(FieldValidation {
                min_length: Some(4),
                ..FieldValidation::default()
            }),
        }]
    }

    fn configure(&self, options: &ProviderOptions) -> Result<(), ProviderError> {
        let api_key = options
            .get("api_key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::invalid_request("omdb", "api_key is required"))?;
        self.state.write().api_key = api_key.to_string();
        Ok(())
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        request: &FetchRequest,
    ) -> Result<Metadata, FetchError> {
        if self.state.read().api_key.is_empty() {
            return Err(ProviderError::auth_failed("omdb", "provider not configured").into());
        }
        if request.name.is_empty() && request.id.is_none() {
            return Err(
                ProviderError::invalid_request("omdb", "request needs a name or an id").into(),
            );
        }

        let params = Self::params_for(request)?;

        let cache_key = format!(
            "{}:{}:{}:{}:{}:{}",
            request.media_kind,
            request.name,
            request.year.map(|y| y.to_string()).unwrap_or_default(),
            request.season,
            request.episode,
            request.id.as_deref().unwrap_or_default(),
        );
        if let Some(cache) = &self.disk_cache {
            if let Some(hit) = cache.get(&cache_key) {
                return Ok(hit);
            }
        }

        let record = self.get_record(cancel, params).await?;
        let metadata = self.record_to_metadata(request, record);

        if let Some(cache) = &self.disk_cache {
            cache.put(&cache_key, &metadata);
        }
        Ok(metadata)
    }

    fn save_cache(&self) -> Result<(), ProviderError> {
        match &self.disk_cache {
            Some(cache) => cache.save("omdb"),
            None => Ok(()),
        }
    }
}
