//! The media-kind detector policy.
//!
//! - File with a video/subtitle extension and a season/episode match: episode.
//! - Other video file: movie.
//! - Directory matching a season pattern: season.
//! - Directory whose children include season dirs or episode files: show.
//! - Any other directory: movie.
//! - Everything else: unknown (skipped by enumeration).

use mediatidy_common::MediaKind;
use mediatidy_parser::{parse, season_folder_number};

use super::MediaNode;

/// Classify one node. Children are consulted for directories, ancestors are
/// not; ancestor-dependent details (episode season fallback, show titles)
/// are resolved during enumeration.
pub fn classify(node: &MediaNode) -> MediaKind {
    if node.is_dir {
        classify_dir(node)
    } else {
        classify_file(node)
    }
}

fn classify_file(node: &MediaNode) -> MediaKind {
    let parsed = parse(&node.name);
    if (parsed.is_video || parsed.is_subtitle)
        && (parsed.season.is_some() || parsed.episode.is_some())
    {
        return MediaKind::Episode;
    }
    if parsed.is_video {
        return MediaKind::Movie;
    }
    MediaKind::Unknown
}

fn classify_dir(node: &MediaNode) -> MediaKind {
    if season_folder_number(&node.name).is_some() {
        return MediaKind::Season;
    }

    let has_season_dirs = node
        .children
        .iter()
        .any(|c| c.is_dir && season_folder_number(&c.name).is_some());
    let has_episode_files = node
        .children
        .iter()
        .any(|c| !c.is_dir && classify_file(c) == MediaKind::Episode);

    if has_season_dirs || has_episode_files {
        return MediaKind::Show;
    }
    MediaKind::Movie
}
