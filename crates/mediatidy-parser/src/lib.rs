//! # mediatidy-parser
//!
//! A filename parser for media libraries.
//!
//! Given a file or folder name this crate extracts the clean title, release
//! year, season/episode numbers, and the media extension, stripping
//! release-encoding tags (resolution, codec, source, edition markers) along
//! the way. It is a pure library: no I/O, no async, no filesystem knowledge
//! beyond the name it is handed.
//!
//! ## Quick start
//!
//! ```
//! use mediatidy_parser::parse;
//!
//! let result = parse("Breaking.Bad.S01E01.1080p.BluRay.mkv");
//!
//! assert_eq!(result.title, "Breaking Bad");
//! assert_eq!(result.season, Some(1));
//! assert_eq!(result.episode, Some(1));
//! assert!(result.is_video);
//! ```

pub mod patterns;

mod episode;
mod title;

use patterns::{SEASON_FOLDER, SPECIALS_FOLDER, SUBTITLE_EXTENSIONS, VIDEO_EXTENSIONS};

/// Structured result of parsing one file or folder name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParsedName {
    /// Cleaned title with scene separators and release tags removed. Empty
    /// when the name carries no title of its own (e.g. `E05.mkv`).
    pub title: String,
    /// Release year within 1900-2100; the first year when a range appears.
    pub year: Option<u16>,
    /// Season number (0 = specials) when the name declares one.
    pub season: Option<u16>,
    /// Episode number when the name declares one.
    pub episode: Option<u16>,
    /// Recognized media extension, lowercased. `None` for folders and
    /// unknown extensions.
    pub extension: Option<String>,
    /// Language code peeled from a subtitle name like `Movie.en.srt`.
    pub subtitle_language: Option<String>,
    /// Whether the extension is a known video container.
    pub is_video: bool,
    /// Whether the extension is a known subtitle format.
    pub is_subtitle: bool,
}

/// Parse a file or folder name into its structured parts.
///
/// Season/episode markers are tried in order: `SxxExx`/`sNxM`/`xXy`, dotted
/// `N.M`, then episode-only tokens (`Exx`, `Episode N`). Numeric matches in
/// the 1900-2100 year band are rejected as season/episode candidates, seasons
/// are capped at 100 (0 meaning specials), and episodes at 300.
pub fn parse(name: &str) -> ParsedName {
    let split = split_extension(name);
    let stem = split.stem;

    let se = episode::extract(stem);
    let years = title::years(stem);

    let se_start = se.as_ref().map(|m| m.span.start);
    let tag_start = title::first_release_tag(stem);

    // The title is everything before the earliest structural marker.
    let mut year_idx = 0usize;
    let mut parsed_title = build_title(stem, years.get(year_idx), se_start, tag_start);

    // A leading year is usually the title ("2012"), unless a later year
    // candidate exists to take over the year role ("2001.A.Space.Odyssey.1968").
    if parsed_title.is_empty() && !years.is_empty() {
        if years.len() > 1 {
            year_idx = 1;
            parsed_title = build_title(stem, years.get(year_idx), se_start, tag_start);
        }
        if parsed_title.is_empty() && se_start.is_none() {
            let end = tag_start.unwrap_or(stem.len());
            parsed_title = title::clean_title(stem, end);
        }
    }

    ParsedName {
        title: parsed_title,
        year: years.get(year_idx).map(|(y, _)| *y),
        season: se.as_ref().and_then(|m| m.season),
        episode: se.as_ref().and_then(|m| m.episode),
        extension: split.extension,
        subtitle_language: split.subtitle_language,
        is_video: split.is_video,
        is_subtitle: split.is_subtitle,
    }
}

/// Whether `ext` (without the dot) is a known video container extension.
pub fn is_video_extension(ext: &str) -> bool {
    let lower = ext.to_ascii_lowercase();
    VIDEO_EXTENSIONS.contains(&lower.as_str())
}

/// Whether `ext` (without the dot) is a known subtitle extension.
pub fn is_subtitle_extension(ext: &str) -> bool {
    let lower = ext.to_ascii_lowercase();
    SUBTITLE_EXTENSIONS.contains(&lower.as_str())
}

/// Season number declared by a folder name like `Season 02`, `S2`, or
/// `Specials` (season 0). `None` when the name is not a season folder.
pub fn season_folder_number(name: &str) -> Option<u16> {
    let trimmed = name.trim();
    if SPECIALS_FOLDER.is_match(trimmed) {
        return Some(0);
    }
    let caps = SEASON_FOLDER.captures(trimmed)?;
    let digits = caps.get(1).or_else(|| caps.get(2))?;
    let n: u16 = digits.as_str().parse().ok()?;
    patterns::valid_season(n).then_some(n)
}

struct ExtensionSplit<'a> {
    stem: &'a str,
    extension: Option<String>,
    subtitle_language: Option<String>,
    is_video: bool,
    is_subtitle: bool,
}

/// Split a known media extension (and a subtitle language suffix) off the
/// name. Unrecognized suffixes are left attached so folder names with dots
/// survive intact.
fn split_extension(name: &str) -> ExtensionSplit<'_> {
    let mut split = ExtensionSplit {
        stem: name,
        extension: None,
        subtitle_language: None,
        is_video: false,
        is_subtitle: false,
    };

    let Some(idx) = name.rfind('.') else {
        return split;
    };
    let ext = name[idx + 1..].to_ascii_lowercase();

    if is_video_extension(&ext) {
        split.stem = &name[..idx];
        split.extension = Some(ext);
        split.is_video = true;
    } else if is_subtitle_extension(&ext) {
        let mut stem = &name[..idx];
        // Peel a trailing language code: "Movie.en.srt" -> stem "Movie".
        if let Some(j) = stem.rfind('.') {
            let lang = &stem[j + 1..];
            if (2..=3).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_alphabetic()) {
                split.subtitle_language = Some(lang.to_ascii_lowercase());
                stem = &stem[..j];
            }
        }
        split.stem = stem;
        split.extension = Some(ext);
        split.is_subtitle = true;
    }

    split
}

fn build_title(
    stem: &str,
    year: Option<&(u16, std::ops::Range<usize>)>,
    se_start: Option<usize>,
    tag_start: Option<usize>,
) -> String {
    let mut end = stem.len();
    if let Some((_, span)) = year {
        end = end.min(span.start);
    }
    if let Some(s) = se_start {
        end = end.min(s);
    }
    if let Some(t) = tag_start {
        end = end.min(t);
    }
    title::clean_title(stem, end)
}
