//! The regex catalog and extension tables used by the parser.
//!
//! Patterns are compiled once via [`LazyLock`]. Numeric matches are validated
//! by the callers (year band 1900-2100, season 0-100, episode 1-300), so the
//! regexes themselves stay permissive about digit counts.

use regex::Regex;
use std::sync::LazyLock;

/// Four-digit year constrained to the 1900-2100 band.
pub static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2}|2100)\b").unwrap());

/// `S01E01`, `s1e2`, `S01.E01`, `S01 E01`.
pub static SEASON_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bs(\d{1,3})[ ._-]?e(\d{1,3})\b").unwrap());

/// `s1x05`.
pub static SEASON_X_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bs(\d{1,3})x(\d{1,3})\b").unwrap());

/// `1x05`, `12X3`.
pub static X_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,3})x(\d{1,3})\b").unwrap());

/// Dotted `N.M` (e.g. `3.05`); both numbers validated against the year band.
pub static DOTTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\.(\d{1,3})\b").unwrap());

/// `Episode 5`, `Ep05`, `Ep.5`.
pub static EPISODE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bep(?:isode)?[ ._-]*(\d{1,3})\b").unwrap());

/// Bare `E05`.
pub static EPISODE_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\be(\d{1,3})\b").unwrap());

/// `Season 02`, `season.2`, `S02` as a full folder name; `Specials` is season 0.
pub static SEASON_FOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:season[ ._-]*(\d{1,3})|s(\d{1,3}))\b").unwrap());

/// Specials folder, mapped to season 0.
pub static SPECIALS_FOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^specials?$").unwrap());

/// Release-encoding tags: resolution, source, codec, audio, edition markers.
///
/// The earliest match marks where the title ends. Group suffixes (`-YIFY`)
/// always trail these tags, so they never need their own pattern.
pub static RELEASE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)\b(?:
            480p|576p|720p|1080p|1440p|2160p|4320p|4k|uhd|
            bluray|blu-ray|bdremux|bdrip|brrip|remux|webrip|web-dl|webdl|web|
            hdtv|dvdrip|dvdscr|dvd|hdrip|camrip|cam|telesync|
            x264|x265|h264|h265|h\.264|h\.265|hevc|avc|av1|xvid|divx|vp9|
            10bit|8bit|hdr10\+|hdr10|hdr|hlg|dolby|dovi|dv|sdr|
            aac|ac3|eac3|dd5\.1|ddp5\.1|dts-hd|dts|truehd|atmos|flac|opus|
            5\.1|7\.1|2\.0|
            extended|unrated|remastered|theatrical|imax|
            directors[\s._-]?cut|proper|repack|limited|internal|
            multi|dual[\s._-]?audio|subbed|dubbed|complete
        )\b",
    )
    .unwrap()
});

/// Dotted matches that are audio layouts, not season/episode numbers.
pub const DOTTED_AUDIO: [&str; 3] = ["5.1", "7.1", "2.0"];

/// File extensions treated as video.
pub const VIDEO_EXTENSIONS: [&str; 14] = [
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ts", "m2ts", "vob",
    "ogv",
];

/// File extensions treated as subtitles.
pub const SUBTITLE_EXTENSIONS: [&str; 6] = ["srt", "sub", "ssa", "ass", "vtt", "idx"];

/// Year band used to reject season/episode candidates that are really years.
pub const YEAR_MIN: u16 = 1900;
/// Upper bound of the year band.
pub const YEAR_MAX: u16 = 2100;

/// Inclusive season bound; 0 means specials.
pub const SEASON_MAX: u16 = 100;
/// Inclusive episode bounds.
pub const EPISODE_MIN: u16 = 1;
/// Upper episode bound.
pub const EPISODE_MAX: u16 = 300;

/// Whether a number falls into the year band.
pub fn in_year_band(n: u16) -> bool {
    (YEAR_MIN..=YEAR_MAX).contains(&n)
}

/// Whether a season number is plausible (0 = specials).
pub fn valid_season(n: u16) -> bool {
    n <= SEASON_MAX
}

/// Whether an episode number is plausible.
pub fn valid_episode(n: u16) -> bool {
    (EPISODE_MIN..=EPISODE_MAX).contains(&n)
}
