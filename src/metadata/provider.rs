//! Trait definition and contract types for metadata providers.
//!
//! This module defines the [`Provider`] trait that all metadata backends
//! (local, TMDB, OMDb, ffprobe, ...) implement, along with the capability,
//! configuration-schema, and template-variable types the UI introspects.

use std::collections::HashMap;

use async_trait::async_trait;
use mediatidy_common::{FetchError, MediaKind, ProviderError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::types::{FetchRequest, Metadata};

/// What a provider can do and how it ranks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Media kinds the provider covers; must be non-empty at registration.
    pub media_kinds: Vec<MediaKind>,
    /// Whether the provider needs stored configuration before it can be
    /// enabled.
    pub requires_auth: bool,
    /// Default priority; higher wins during merging.
    pub priority: i32,
}

impl ProviderCapabilities {
    /// Whether the provider covers the given media kind.
    pub fn supports(&self, kind: MediaKind) -> bool {
        self.media_kinds.contains(&kind)
    }
}

/// Type of a provider configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int,
    Bool,
    Select,
    Password,
    String,
}

/// Validation constraints for a configuration field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldValidation {
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub min_value: Option<i64>,
    #[serde(default)]
    pub max_value: Option<i64>,
    /// Allowed values for `Select` fields.
    #[serde(default)]
    pub options: Vec<String>,
}

/// One field of a provider's configuration schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigField {
    pub name: String,
    pub display_name: String,
    pub field_type: FieldType,
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    pub description: String,
    /// Whether the value must be masked in UIs.
    pub sensitive: bool,
    #[serde(default)]
    pub validation: Option<FieldValidation>,
}

/// A declarative template variable a provider can fill in.
///
/// The catalog is exposed verbatim for UI introspection; the enrichment core
/// never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub media_kinds: Vec<MediaKind>,
    pub example: String,
    pub category: String,
    pub format: String,
}

impl TemplateVariable {
    /// Catalog entry helper used by the bundled providers.
    pub fn new(
        name: &str,
        display_name: &str,
        description: &str,
        media_kinds: &[MediaKind],
        example: &str,
        category: &str,
        format: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            description: description.to_string(),
            media_kinds: media_kinds.to_vec(),
            example: example.to_string(),
            category: category.to_string(),
            format: format.to_string(),
        }
    }
}

/// Options applied to a provider via [`Provider::configure`].
pub type ProviderOptions = HashMap<String, Value>;

/// Async trait that all metadata providers implement.
///
/// Providers are stateless with respect to callers: two concurrent
/// [`fetch`](Provider::fetch) calls must be safe. Long-lived resources (HTTP
/// clients, disk caches) belong to the provider itself and live as long as
/// the registry holds it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short, lowercase identifier (e.g. `"tmdb"`).
    fn name(&self) -> &'static str;

    /// One-line human-readable description.
    fn description(&self) -> &'static str;

    /// Declared capabilities. Must be stable across the provider's lifetime.
    fn capabilities(&self) -> ProviderCapabilities;

    /// The template variables this provider can supply.
    fn supported_variables(&self) -> Vec<TemplateVariable>;

    /// The provider's configuration schema.
    fn config_schema(&self) -> Vec<ConfigField>;

    /// Apply configuration options. Called before [`fetch`](Provider::fetch)
    /// and again whenever the stored options change.
    fn configure(&self, options: &ProviderOptions) -> Result<(), ProviderError>;

    /// Fetch metadata for one request.
    ///
    /// Implementations must thread `cancel` into their I/O so in-flight calls
    /// return promptly on cancellation, reporting [`FetchError::Cancelled`].
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        request: &FetchRequest,
    ) -> Result<Metadata, FetchError>;

    /// Persist the provider's on-disk cache blob, when it keeps one.
    fn save_cache(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_supports() {
        let caps = ProviderCapabilities {
            media_kinds: vec![MediaKind::Movie, MediaKind::Episode],
            requires_auth: false,
            priority: 10,
        };
        assert!(caps.supports(MediaKind::Movie));
        assert!(caps.supports(MediaKind::Episode));
        assert!(!caps.supports(MediaKind::Show));
    }

    #[test]
    fn field_type_serialization() {
        assert_eq!(
            serde_json::to_string(&FieldType::Password).unwrap(),
            r#""password""#
        );
    }

    #[test]
    fn config_field_roundtrip() {
        let field = ConfigField {
            name: "api_key".to_string(),
            display_name: "API Key".to_string(),
            field_type: FieldType::Password,
            required: true,
            default: None,
            description: "Catalog API key".to_string(),
            sensitive: true,
            validation: Some(FieldValidation {
                min_length: Some(8),
                ..FieldValidation::default()
            }),
        };
        let json = serde_json::to_string(&field).unwrap();
        let back: ConfigField = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "api_key");
        assert_eq!(back.field_type, FieldType::Password);
        assert_eq!(back.validation.unwrap().min_length, Some(8));
    }
}
