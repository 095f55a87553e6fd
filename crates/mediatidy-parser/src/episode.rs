//! Season and episode number extraction.
//!
//! Patterns are tried in a fixed order: explicit `SxxExx`-style forms first,
//! then dotted `N.M`, then episode-only tokens. The first pattern that yields
//! an in-range match wins; later patterns are not consulted.

use std::ops::Range;

use crate::patterns::{
    self, DOTTED, DOTTED_AUDIO, EPISODE_ONLY, EPISODE_WORD, SEASON_EPISODE, SEASON_X_EPISODE,
    X_EPISODE,
};

/// A season/episode hit and the byte span it occupied in the stem.
#[derive(Debug, Clone)]
pub(crate) struct EpisodeMatch {
    pub season: Option<u16>,
    pub episode: Option<u16>,
    pub span: Range<usize>,
}

/// Extract season/episode numbers from a filename stem.
pub(crate) fn extract(stem: &str) -> Option<EpisodeMatch> {
    // 1. Explicit season+episode forms: SxxExx, sNxM, xXy.
    for re in [&*SEASON_EPISODE, &*SEASON_X_EPISODE, &*X_EPISODE] {
        for caps in re.captures_iter(stem) {
            let (Ok(season), Ok(episode)) = (caps[1].parse::<u16>(), caps[2].parse::<u16>())
            else {
                continue;
            };
            if patterns::valid_season(season) && patterns::valid_episode(episode) {
                let m = caps.get(0).unwrap();
                return Some(EpisodeMatch {
                    season: Some(season),
                    episode: Some(episode),
                    span: m.range(),
                });
            }
        }
    }

    // 2. Dotted N.M, guarded against audio layouts and the year band.
    for caps in DOTTED.captures_iter(stem) {
        let text = caps.get(0).unwrap().as_str();
        if DOTTED_AUDIO.contains(&text) {
            continue;
        }
        let (Ok(season), Ok(episode)) = (caps[1].parse::<u16>(), caps[2].parse::<u16>()) else {
            continue;
        };
        if patterns::in_year_band(season) || patterns::in_year_band(episode) {
            continue;
        }
        if patterns::valid_season(season) && patterns::valid_episode(episode) {
            let m = caps.get(0).unwrap();
            return Some(EpisodeMatch {
                season: Some(season),
                episode: Some(episode),
                span: m.range(),
            });
        }
    }

    // 3. Episode-only tokens; the season comes from directory context, if at
    //    all.
    for re in [&*EPISODE_WORD, &*EPISODE_ONLY] {
        for caps in re.captures_iter(stem) {
            let Ok(episode) = caps[1].parse::<u16>() else {
                continue;
            };
            if patterns::valid_episode(episode) {
                let m = caps.get(0).unwrap();
                return Some(EpisodeMatch {
                    season: None,
                    episode: Some(episode),
                    span: m.range(),
                });
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn se(stem: &str) -> (Option<u16>, Option<u16>) {
        extract(stem).map_or((None, None), |m| (m.season, m.episode))
    }

    #[test]
    fn sxx_exx() {
        assert_eq!(se("Breaking.Bad.S01E01.1080p.BluRay"), (Some(1), Some(1)));
        assert_eq!(se("show S2 E13"), (Some(2), Some(13)));
        assert_eq!(se("Show.s10e200"), (Some(10), Some(200)));
    }

    #[test]
    fn x_forms() {
        assert_eq!(se("Show.1x05"), (Some(1), Some(5)));
        assert_eq!(se("Show s3x12 finale"), (Some(3), Some(12)));
    }

    #[test]
    fn dotted() {
        assert_eq!(se("Show 3.05"), (Some(3), Some(5)));
        // Audio layouts are not episode markers.
        assert_eq!(se("Movie DTS 5.1 surround"), (None, None));
    }

    #[test]
    fn episode_only() {
        assert_eq!(se("E05"), (None, Some(5)));
        assert_eq!(se("Episode 12"), (None, Some(12)));
        assert_eq!(se("Ep.7 finale"), (None, Some(7)));
    }

    #[test]
    fn explicit_form_wins_over_dotted() {
        assert_eq!(se("Show.3.05.S02E08"), (Some(2), Some(8)));
    }

    #[test]
    fn out_of_range_rejected() {
        // Resolution-like pairs exceed the episode bound.
        assert_eq!(se("Movie 1280x720"), (None, None));
        // Seasons are capped at 100.
        assert_eq!(se("S101E01"), (None, None));
        // Episode 0 is invalid.
        assert_eq!(se("S01E00"), (None, None));
    }

    #[test]
    fn year_band_never_parses_as_episode() {
        assert_eq!(se("Avatar 2009"), (None, None));
        assert_eq!(se("Movie.12.2019"), (None, None));
    }

    #[test]
    fn no_match() {
        assert_eq!(se("The Matrix"), (None, None));
    }
}
