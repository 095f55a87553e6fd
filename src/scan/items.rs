//! Enumeration of the work items the pipeline processes.
//!
//! Walks the supplied tree, classifies every node, resolves titles and
//! seasons from ancestor directories (up to 3 levels), and assigns each item
//! its phase and canonical fingerprint.

use mediatidy_common::{fingerprint, MediaKind, Phase};
use mediatidy_parser::{parse, season_folder_number};

use crate::metadata::types::MetadataItem;

use super::classify::classify;
use super::MediaNode;

/// How many ancestor directories are inspected when a node does not carry
/// its own title or season.
const ANCESTOR_DEPTH: usize = 3;

/// Enumerate the metadata items for `root` and everything below it.
///
/// Unknown nodes are skipped; duplicate logical entities (a movie folder and
/// the movie file inside it) share a fingerprint and are deduplicated by the
/// scheduler's cache check.
pub fn enumerate(root: &MediaNode) -> Vec<MetadataItem> {
    let mut items = Vec::new();
    let mut ancestors: Vec<&MediaNode> = Vec::new();
    walk(root, &mut ancestors, &mut items);
    items
}

fn walk<'a>(
    node: &'a MediaNode,
    ancestors: &mut Vec<&'a MediaNode>,
    items: &mut Vec<MetadataItem>,
) {
    if let Some(item) = item_for(node, ancestors) {
        items.push(item);
    }
    ancestors.push(node);
    for child in &node.children {
        walk(child, ancestors, items);
    }
    ancestors.pop();
}

fn item_for(node: &MediaNode, ancestors: &[&MediaNode]) -> Option<MetadataItem> {
    let kind = classify(node);
    if kind == MediaKind::Unknown {
        return None;
    }

    let parsed = parse(&node.name);
    let (name, year, season, episode) = match kind {
        MediaKind::Movie | MediaKind::Show => {
            let name = if parsed.title.is_empty() {
                node.name.clone()
            } else {
                parsed.title.clone()
            };
            (name, parsed.year, 0, 0)
        }
        MediaKind::Season => {
            let season = season_folder_number(&node.name)
                .or(parsed.season)
                .unwrap_or(0);
            let (name, year) = show_context(ancestors)
                .unwrap_or_else(|| (node.name.clone(), parsed.year));
            (name, year, season, 0)
        }
        MediaKind::Episode => {
            let episode = parsed.episode.unwrap_or(0);
            let season = parsed
                .season
                .or_else(|| ancestor_season(ancestors))
                .unwrap_or(0);
            let context = show_context(ancestors);
            let name = if parsed.title.is_empty() {
                context
                    .as_ref()
                    .map(|(name, _)| name.clone())
                    .unwrap_or_default()
            } else {
                parsed.title.clone()
            };
            let year = parsed
                .year
                .or_else(|| context.as_ref().and_then(|(_, year)| *year));
            (name, year, season, episode)
        }
        MediaKind::Unknown => unreachable!(),
    };

    let key = fingerprint(kind, &name, year, season, episode);
    Some(MetadataItem {
        key,
        name,
        year,
        season,
        episode,
        media_kind: kind,
        phase: Phase::for_kind(kind),
        node_path: node.path.clone(),
    })
}

/// The nearest season number declared by an ancestor directory.
fn ancestor_season(ancestors: &[&MediaNode]) -> Option<u16> {
    ancestors
        .iter()
        .rev()
        .take(ANCESTOR_DEPTH)
        .find_map(|a| season_folder_number(&a.name))
}

/// Title and year of the nearest ancestor that looks like a show folder
/// (i.e. is not itself a season directory).
fn show_context(ancestors: &[&MediaNode]) -> Option<(String, Option<u16>)> {
    ancestors
        .iter()
        .rev()
        .take(ANCESTOR_DEPTH)
        .filter(|a| season_folder_number(&a.name).is_none())
        .find_map(|a| {
            let parsed = parse(&a.name);
            if parsed.title.is_empty() {
                None
            } else {
                Some((parsed.title, parsed.year))
            }
        })
}
