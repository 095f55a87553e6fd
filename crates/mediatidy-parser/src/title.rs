//! Year extraction and title cleanup.

use std::ops::Range;

use crate::patterns::{RELEASE_TAG, YEAR};

/// All year candidates in the stem, in order of appearance.
///
/// When a year range like `(2016-2024)` appears, the first year wins; the
/// second simply shows up as a later candidate nobody asks for.
pub(crate) fn years(stem: &str) -> Vec<(u16, Range<usize>)> {
    YEAR.find_iter(stem)
        .filter_map(|m| m.as_str().parse::<u16>().ok().map(|y| (y, m.range())))
        .collect()
}

/// Byte offset of the earliest release-encoding tag, if any.
pub(crate) fn first_release_tag(stem: &str) -> Option<usize> {
    RELEASE_TAG.find(stem).map(|m| m.start())
}

/// Clean the title portion of a stem, cut at `end`.
///
/// Scene separators (`.`/`_`) become spaces, trailing punctuation left over
/// from a cut marker (`(`, `[`, `-`) is trimmed, and runs of whitespace
/// collapse to one space.
pub(crate) fn clean_title(stem: &str, end: usize) -> String {
    let prefix = &stem[..end];
    let replaced: String = prefix
        .chars()
        .map(|c| if c == '.' || c == '_' { ' ' } else { c })
        .collect();
    let trimmed = replaced.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '-' | '(' | '[' | '{' | ')' | ']' | '}')
    });
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_year_wins_in_ranges() {
        let ys = years("Stranger Things (2016-2024)");
        assert_eq!(ys[0].0, 2016);
        assert_eq!(ys[1].0, 2024);
    }

    #[test]
    fn out_of_band_numbers_ignored() {
        assert!(years("Movie 1899").is_empty());
        assert!(years("12345").is_empty());
    }

    #[test]
    fn clean_replaces_scene_separators() {
        assert_eq!(clean_title("Breaking.Bad.", 13), "Breaking Bad");
        assert_eq!(clean_title("The Matrix (", 12), "The Matrix");
        assert_eq!(clean_title("Some_Show_-_", 12), "Some Show");
    }

    #[test]
    fn release_tag_position() {
        let stem = "Avatar.2009.1080p.BluRay.x264-YIFY";
        let pos = first_release_tag(stem).unwrap();
        assert_eq!(&stem[pos..pos + 5], "1080p");
    }
}
