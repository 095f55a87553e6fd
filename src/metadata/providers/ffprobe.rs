//! Technical probe provider backed by the `ffprobe` CLI.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format
//! -show_streams` against the file named by the request's `path` hint and
//! contributes technical facts (container, codecs, resolution, duration) as
//! extended fields. It never claims title-level metadata it cannot prove.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use mediatidy_common::{FetchError, MediaKind, ProviderError};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metadata::provider::{
    ConfigField, FieldType, Provider, ProviderCapabilities, ProviderOptions, TemplateVariable,
};
use crate::metadata::types::{FetchRequest, Metadata};

// ---------------------------------------------------------------------------
// ffprobe JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    channels: Option<u32>,
    #[serde(default)]
    tags: FfprobeTags,
}

// ---------------------------------------------------------------------------
// Provider implementation
// ---------------------------------------------------------------------------

/// Technical metadata provider. Covers movies and episodes only.
pub struct FfprobeProvider {
    binary: RwLock<Option<PathBuf>>,
}

impl FfprobeProvider {
    /// Create the provider. When `binary` is unset, `ffprobe` is discovered
    /// on `PATH` at fetch time.
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self {
            binary: RwLock::new(binary),
        }
    }

    fn resolve_binary(&self) -> Result<PathBuf, ProviderError> {
        if let Some(path) = self.binary.read().clone() {
            return Ok(path);
        }
        which::which("ffprobe")
            .map_err(|_| ProviderError::unavailable("ffprobe", "ffprobe binary not found"))
    }

    async fn probe(
        &self,
        cancel: &CancellationToken,
        binary: &Path,
        path: &str,
    ) -> Result<FfprobeOutput, FetchError> {
        let mut command = tokio::process::Command::new(binary);
        command
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(path = %path, "Running ffprobe");
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = command.output() => result
                .map_err(|e| ProviderError::unavailable("ffprobe", format!("failed to spawn: {e}")))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::unknown(
                "ffprobe",
                format!("probe failed ({}): {}", output.status, stderr.trim()),
            )
            .into());
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ProviderError::parse_error("ffprobe", format!("bad probe output: {e}")).into())
    }

    fn output_to_metadata(&self, request: &FetchRequest, output: FfprobeOutput) -> Metadata {
        let mut md = Metadata::new(request.media_kind);

        if let Some(container) = output.format.format_name {
            md.set_extended("container", json!(container), "ffprobe");
        }
        if let Some(duration) = output.format.duration.and_then(|d| d.parse::<f64>().ok()) {
            md.set_extended("duration_secs", json!(duration), "ffprobe");
        }
        if let Some(size) = output.format.size.and_then(|s| s.parse::<u64>().ok()) {
            md.set_extended("file_size", json!(size), "ffprobe");
        }

        let mut audio_languages: Vec<String> = Vec::new();
        let mut subtitle_languages: Vec<String> = Vec::new();
        for stream in output.streams {
            match stream.codec_type.as_deref() {
                Some("video") => {
                    // First video stream wins; attachments and cover art come
                    // later in the list.
                    if !md.extended.contains_key("video_codec") {
                        if let Some(codec) = stream.codec_name {
                            md.set_extended("video_codec", json!(codec), "ffprobe");
                        }
                        if let (Some(width), Some(height)) = (stream.width, stream.height) {
                            md.set_extended("video_width", json!(width), "ffprobe");
                            md.set_extended("video_height", json!(height), "ffprobe");
                            md.set_extended(
                                "resolution",
                                json!(format!("{width}x{height}")),
                                "ffprobe",
                            );
                        }
                    }
                }
                Some("audio") => {
                    if !md.extended.contains_key("audio_codec") {
                        if let Some(codec) = stream.codec_name {
                            md.set_extended("audio_codec", json!(codec), "ffprobe");
                        }
                        if let Some(channels) = stream.channels {
                            md.set_extended("audio_channels", json!(channels), "ffprobe");
                        }
                    }
                    if let Some(language) = stream.tags.language {
                        audio_languages.push(language);
                    }
                }
                Some("subtitle") => {
                    if let Some(language) = stream.tags.language {
                        subtitle_languages.push(language);
                    }
                }
                _ => {}
            }
        }
        if !audio_languages.is_empty() {
            md.set_extended("audio_languages", json!(audio_languages), "ffprobe");
        }
        if !subtitle_languages.is_empty() {
            md.set_extended("subtitle_languages", json!(subtitle_languages), "ffprobe");
        }

        // Technical facts about the file itself are ground truth.
        md.confidence = 1.0;
        md.attribute_core("ffprobe");
        md
    }
}

#[async_trait]
impl Provider for FfprobeProvider {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    fn description(&self) -> &'static str {
        "Technical metadata probed from the media file"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            media_kinds: vec![MediaKind::Movie, MediaKind::Episode],
            requires_auth: false,
            priority: 10,
        }
    }

    fn supported_variables(&self) -> Vec<TemplateVariable> {
        let kinds = [MediaKind::Movie, MediaKind::Episode];
        vec![
            TemplateVariable::new(
                "resolution",
                "Resolution",
                "Video frame size",
                &kinds,
                "1920x1080",
                "technical",
                "string",
            ),
            TemplateVariable::new(
                "video_codec",
                "Video Codec",
                "Codec of the primary video stream",
                &kinds,
                "hevc",
                "technical",
                "string",
            ),
            TemplateVariable::new(
                "audio_codec",
                "Audio Codec",
                "Codec of the primary audio stream",
                &kinds,
                "aac",
                "technical",
                "string",
            ),
            TemplateVariable::new(
                "duration_secs",
                "Duration",
                "Runtime in seconds",
                &kinds,
                "8134.2",
                "technical",
                "number",
            ),
        ]
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![ConfigField {
            name: "binary_path".to_string(),
            display_name: "ffprobe Path".to_string(),
            field_type: FieldType::String,
            required: false,
            default: None,
            description: "Path to the ffprobe binary; discovered on PATH when empty".to_string(),
            sensitive: false,
            validation: None,
        }]
    }

    fn configure(&self, options: &ProviderOptions) -> Result<(), ProviderError> {
        if let Some(path) = options.get("binary_path").and_then(|v| v.as_str()) {
            *self.binary.write() = Some(PathBuf::from(path));
        }
        Ok(())
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        request: &FetchRequest,
    ) -> Result<Metadata, FetchError> {
        if !matches!(request.media_kind, MediaKind::Movie | MediaKind::Episode) {
            return Err(ProviderError::unsupported_media_type(
                "ffprobe",
                format!("cannot probe a {}", request.media_kind),
            )
            .into());
        }
        let Some(path) = request.extra_str("path") else {
            return Err(
                ProviderError::missing_path("ffprobe", "request carries no file path").into(),
            );
        };
        if !Path::new(path).exists() {
            return Err(
                ProviderError::missing_path("ffprobe", format!("no such file: {path}")).into(),
            );
        }

        let binary = self.resolve_binary()?;
        let output = self.probe(cancel, &binary, path).await?;
        Ok(self.output_to_metadata(request, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediatidy_common::ErrorCode;
    use serde_json::json;

    fn request_with_path(kind: MediaKind, path: Option<&str>) -> FetchRequest {
        let mut request = FetchRequest {
            media_kind: kind,
            name: "Test".to_string(),
            ..FetchRequest::default()
        };
        if let Some(path) = path {
            request.extra.insert("path".to_string(), json!(path));
        }
        request
    }

    #[tokio::test]
    async fn rejects_unsupported_kinds() {
        let provider = FfprobeProvider::new(None);
        let cancel = CancellationToken::new();
        for kind in [MediaKind::Show, MediaKind::Season, MediaKind::Unknown] {
            let err = provider
                .fetch(&cancel, &request_with_path(kind, Some("/tmp/x.mkv")))
                .await
                .unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::UnsupportedMediaType));
        }
    }

    #[tokio::test]
    async fn missing_path_hint() {
        let provider = FfprobeProvider::new(None);
        let err = provider
            .fetch(
                &CancellationToken::new(),
                &request_with_path(MediaKind::Movie, None),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::MissingPath));
    }

    #[tokio::test]
    async fn nonexistent_file() {
        let provider = FfprobeProvider::new(None);
        let err = provider
            .fetch(
                &CancellationToken::new(),
                &request_with_path(MediaKind::Movie, Some("/definitely/not/here.mkv")),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::MissingPath));
    }

    #[test]
    fn output_mapping_takes_first_streams() {
        let provider = FfprobeProvider::new(None);
        let output = FfprobeOutput {
            format: FfprobeFormat {
                format_name: Some("matroska,webm".to_string()),
                duration: Some("7200.5".to_string()),
                size: Some("4294967296".to_string()),
            },
            streams: vec![
                FfprobeStream {
                    codec_type: Some("video".to_string()),
                    codec_name: Some("hevc".to_string()),
                    width: Some(3840),
                    height: Some(2160),
                    channels: None,
                    tags: FfprobeTags::default(),
                },
                FfprobeStream {
                    codec_type: Some("audio".to_string()),
                    codec_name: Some("eac3".to_string()),
                    width: None,
                    height: None,
                    channels: Some(6),
                    tags: FfprobeTags {
                        language: Some("eng".to_string()),
                    },
                },
                FfprobeStream {
                    codec_type: Some("audio".to_string()),
                    codec_name: Some("aac".to_string()),
                    width: None,
                    height: None,
                    channels: Some(2),
                    tags: FfprobeTags {
                        language: Some("ger".to_string()),
                    },
                },
                FfprobeStream {
                    codec_type: Some("subtitle".to_string()),
                    codec_name: Some("subrip".to_string()),
                    width: None,
                    height: None,
                    channels: None,
                    tags: FfprobeTags {
                        language: Some("eng".to_string()),
                    },
                },
            ],
        };

        let request = request_with_path(MediaKind::Movie, Some("/tmp/x.mkv"));
        let md = provider.output_to_metadata(&request, output);

        assert_eq!(md.extended["container"], "matroska,webm");
        assert_eq!(md.extended["resolution"], "3840x2160");
        assert_eq!(md.extended["video_codec"], "hevc");
        // The first audio stream wins the codec slot; languages accumulate.
        assert_eq!(md.extended["audio_codec"], "eac3");
        assert_eq!(md.extended["audio_channels"], 6);
        assert_eq!(md.extended["audio_languages"], json!(["eng", "ger"]));
        assert_eq!(md.extended["subtitle_languages"], json!(["eng"]));
        assert_eq!(md.extended["duration_secs"], 7200.5);
        assert!((md.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(md.source_of("video_codec"), Some("ffprobe"));
        // No title-level claims.
        assert!(md.core.title.is_empty());
    }
}
