//! Core enums and the canonical cache fingerprint.
//!
//! All enums are serialized in lowercase so they match the on-wire form used
//! by provider payloads and configuration files.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media a library node or work item refers to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// A single movie.
    Movie,
    /// A TV series (show).
    Show,
    /// A season within a show.
    Season,
    /// A single episode within a season.
    Episode,
    /// Unclassifiable node. Items of this kind are uncacheable.
    #[default]
    Unknown,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie => write!(f, "movie"),
            Self::Show => write!(f, "show"),
            Self::Season => write!(f, "season"),
            Self::Episode => write!(f, "episode"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(Self::Movie),
            "show" => Ok(Self::Show),
            "season" => Ok(Self::Season),
            "episode" => Ok(Self::Episode),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Invalid media kind: {}", s)),
        }
    }
}

/// One of the three strictly ordered processing stages.
///
/// Phase N+1 only begins after every Phase N item has completed or been
/// cancelled, which is what lets season and episode lookups assume their
/// show's record is already cached.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Phase 0: shows and movies.
    #[default]
    ShowsAndMovies,
    /// Phase 1: seasons.
    Seasons,
    /// Phase 2: episodes.
    Episodes,
}

impl Phase {
    /// All phases in scheduling order.
    pub const ALL: [Phase; 3] = [Phase::ShowsAndMovies, Phase::Seasons, Phase::Episodes];

    /// Stable numeric index (0..=2).
    pub fn index(self) -> usize {
        match self {
            Self::ShowsAndMovies => 0,
            Self::Seasons => 1,
            Self::Episodes => 2,
        }
    }

    /// Human-readable name used in progress summaries.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::ShowsAndMovies => "Shows & Movies",
            Self::Seasons => "Seasons",
            Self::Episodes => "Episodes",
        }
    }

    /// The phase a media kind is processed in.
    pub fn for_kind(kind: MediaKind) -> Phase {
        match kind {
            MediaKind::Movie | MediaKind::Show | MediaKind::Unknown => Self::ShowsAndMovies,
            MediaKind::Season => Self::Seasons,
            MediaKind::Episode => Self::Episodes,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Canonical cache key for a media item.
///
/// The format is stable and documented; callers (and tests) depend on the
/// exact string:
///
/// - movie:   `movie:<name>:<year>`
/// - show:    `show:<name>:<year>`
/// - season:  `season:<name>:<year>:<season>`
/// - episode: `episode:<name>:<year>:<season>:<episode>`
///
/// An unknown media kind yields the empty string; callers must treat such
/// items as uncacheable.
pub fn fingerprint(
    kind: MediaKind,
    name: &str,
    year: Option<u16>,
    season: u16,
    episode: u16,
) -> String {
    let year = year.map(|y| y.to_string()).unwrap_or_default();
    match kind {
        MediaKind::Movie => format!("movie:{}:{}", name, year),
        MediaKind::Show => format!("show:{}:{}", name, year),
        MediaKind::Season => format!("season:{}:{}:{}", name, year, season),
        MediaKind::Episode => format!("episode:{}:{}:{}:{}", name, year, season, episode),
        MediaKind::Unknown => String::new(),
    }
}
