//! The provider error envelope.
//!
//! Every metadata backend reports failures through [`ProviderError`], a
//! wire-compatible envelope with a stable set of [`ErrorCode`]s. The
//! enrichment pipeline wraps it in [`FetchError`] so cancellation can travel
//! alongside provider failures without ever being recorded as one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes shared by all providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The request was malformed (missing name, bad combination of fields).
    InvalidRequest,
    /// The provider does not cover the requested media kind.
    UnsupportedMediaType,
    /// A file path was required but not supplied.
    MissingPath,
    /// The provider has no record for the request.
    NotFound,
    /// Authentication with the provider failed.
    AuthFailed,
    /// The provider (or the local limiter) refused the request for pacing.
    RateLimited,
    /// The provider could not be reached or returned a server error.
    Unavailable,
    /// The provider's response could not be parsed.
    ParseError,
    /// Anything that does not fit another code.
    Unknown,
    /// The operation is not implemented by this provider.
    NotImplemented,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            Self::MissingPath => "MISSING_PATH",
            Self::NotFound => "NOT_FOUND",
            Self::AuthFailed => "AUTH_FAILED",
            Self::RateLimited => "RATE_LIMITED",
            Self::Unavailable => "UNAVAILABLE",
            Self::ParseError => "PARSE_ERROR",
            Self::Unknown => "UNKNOWN",
            Self::NotImplemented => "NOT_IMPLEMENTED",
        };
        write!(f, "{}", s)
    }
}

/// A provider's refusal or failure for one request.
///
/// `retry` hints that the same request may succeed later; `retry_after` is
/// the provider-suggested wait in seconds, 0 when unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{provider}: {code}: {message}")]
pub struct ProviderError {
    /// Name of the provider that produced the error.
    pub provider: String,
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
    /// Whether retrying the identical request may succeed.
    #[serde(default)]
    pub retry: bool,
    /// Provider-suggested wait in seconds before retrying; 0 when unset.
    #[serde(default)]
    pub retry_after: u64,
}

impl ProviderError {
    /// Create an error with `retry = false` and no retry-after hint.
    pub fn new<P, M>(provider: P, code: ErrorCode, message: M) -> Self
    where
        P: Into<String>,
        M: Into<String>,
    {
        Self {
            provider: provider.into(),
            code,
            message: message.into(),
            retry: false,
            retry_after: 0,
        }
    }

    /// Create an `INVALID_REQUEST` error.
    pub fn invalid_request<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::new(provider, ErrorCode::InvalidRequest, message)
    }

    /// Create an `UNSUPPORTED_MEDIA_TYPE` error.
    pub fn unsupported_media_type<P: Into<String>, M: Into<String>>(
        provider: P,
        message: M,
    ) -> Self {
        Self::new(provider, ErrorCode::UnsupportedMediaType, message)
    }

    /// Create a `MISSING_PATH` error.
    pub fn missing_path<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::new(provider, ErrorCode::MissingPath, message)
    }

    /// Create a `NOT_FOUND` error.
    pub fn not_found<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::new(provider, ErrorCode::NotFound, message)
    }

    /// Create an `AUTH_FAILED` error.
    pub fn auth_failed<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::new(provider, ErrorCode::AuthFailed, message)
    }

    /// Create a retryable `RATE_LIMITED` error with an optional wait hint.
    pub fn rate_limited<P: Into<String>, M: Into<String>>(
        provider: P,
        message: M,
        retry_after: u64,
    ) -> Self {
        Self {
            retry: true,
            retry_after,
            ..Self::new(provider, ErrorCode::RateLimited, message)
        }
    }

    /// Create a retryable `UNAVAILABLE` error.
    pub fn unavailable<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self {
            retry: true,
            ..Self::new(provider, ErrorCode::Unavailable, message)
        }
    }

    /// Create a `PARSE_ERROR` error.
    pub fn parse_error<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::new(provider, ErrorCode::ParseError, message)
    }

    /// Create an `UNKNOWN` error.
    pub fn unknown<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::new(provider, ErrorCode::Unknown, message)
    }

    /// Create a `NOT_IMPLEMENTED` error.
    pub fn not_implemented<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::new(provider, ErrorCode::NotImplemented, message)
    }

    /// Whether this error makes the whole enrichment run fatal in aggregate.
    pub fn is_fatal(&self) -> bool {
        matches!(self.code, ErrorCode::AuthFailed | ErrorCode::Unavailable)
    }
}

/// Outcome of a single provider fetch, distinguishing cancellation.
///
/// Cancellation and deadline expiry are never recorded as failures, so they
/// are a separate variant rather than an [`ErrorCode`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// The provider refused or failed the request.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The operation was cancelled before completion.
    #[error("operation cancelled")]
    Cancelled,
}

impl FetchError {
    /// The provider error code, if this is a provider error.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Provider(e) => Some(e.code),
            Self::Cancelled => None,
        }
    }

    /// Whether the fetch was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the fetch ended in `NOT_FOUND`.
    pub fn is_not_found(&self) -> bool {
        self.code() == Some(ErrorCode::NotFound)
    }

    /// Whether this outcome belongs in the failure list.
    ///
    /// Cancellation is never recorded; `NOT_FOUND` is silently dropped
    /// because providers routinely disagree on coverage.
    pub fn should_record(&self) -> bool {
        !self.is_cancelled() && !self.is_not_found()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProviderError::not_found("tmdb", "no match for query");
        assert_eq!(err.to_string(), "tmdb: NOT_FOUND: no match for query");
    }

    #[test]
    fn code_serialization_is_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::UnsupportedMediaType).unwrap(),
            r#""UNSUPPORTED_MEDIA_TYPE""#
        );
        let code: ErrorCode = serde_json::from_str(r#""RATE_LIMITED""#).unwrap();
        assert_eq!(code, ErrorCode::RateLimited);
    }

    #[test]
    fn envelope_roundtrip() {
        let err = ProviderError::rate_limited("omdb", "too many requests", 30);
        let json = serde_json::to_string(&err).unwrap();
        let back: ProviderError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
        assert!(back.retry);
        assert_eq!(back.retry_after, 30);
    }

    #[test]
    fn envelope_defaults_retry_fields() {
        let json = r#"{"provider":"x","code":"UNKNOWN","message":"m"}"#;
        let err: ProviderError = serde_json::from_str(json).unwrap();
        assert!(!err.retry);
        assert_eq!(err.retry_after, 0);
    }

    #[test]
    fn fatal_codes() {
        assert!(ProviderError::auth_failed("tmdb", "bad key").is_fatal());
        assert!(ProviderError::unavailable("tmdb", "503").is_fatal());
        assert!(!ProviderError::rate_limited("tmdb", "429", 1).is_fatal());
        assert!(!ProviderError::not_found("tmdb", "nope").is_fatal());
    }

    #[test]
    fn recording_policy() {
        let cancelled = FetchError::Cancelled;
        assert!(!cancelled.should_record());

        let not_found: FetchError = ProviderError::not_found("tmdb", "nope").into();
        assert!(!not_found.should_record());

        let unknown: FetchError = ProviderError::unknown("tmdb", "boom").into();
        assert!(unknown.should_record());
        assert_eq!(unknown.code(), Some(ErrorCode::Unknown));
    }
}
