//! Tree model, media-kind detection, and work-item enumeration.
//!
//! Tree construction itself belongs to an external indexer; this module
//! consumes the supplied [`MediaNode`] tree, classifies every node, and
//! enumerates the [`MetadataItem`]s the pipeline will process, partitioned
//! into phases.

mod classify;
mod items;

pub use classify::classify;
pub use items::enumerate;

use std::path::PathBuf;

/// One node of the media tree handed over by the indexer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaNode {
    /// File or directory name (not a path).
    pub name: String,
    /// Absolute path of the underlying entry, when it has one.
    pub path: Option<PathBuf>,
    /// Whether this node is a directory.
    pub is_dir: bool,
    /// Child nodes, in indexer order.
    pub children: Vec<MediaNode>,
}

impl MediaNode {
    /// A file node without a backing path.
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A file node with a backing path.
    pub fn file_at(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// A directory node with children.
    pub fn dir(name: impl Into<String>, children: Vec<MediaNode>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            children,
            ..Self::default()
        }
    }
}
