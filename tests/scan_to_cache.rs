//! Tree scan through enrichment with the built-in providers.
//!
//! Only the local provider is enabled by default, so these tests cover the
//! no-credentials path end to end: classify, enumerate, enrich, cache.

use std::sync::Arc;

use mediatidy::config::EnrichmentConfig;
use mediatidy::metadata::registry::ProviderRegistry;
use mediatidy::pipeline::Enricher;
use mediatidy::scan::{self, MediaNode};
use mediatidy::MediaKind;

fn library() -> Vec<MediaNode> {
    vec![
        MediaNode::dir(
            "Breaking Bad (2008)",
            vec![MediaNode::dir(
                "Season 01",
                vec![
                    MediaNode::file("Breaking.Bad.S01E01.1080p.BluRay.mkv"),
                    MediaNode::file("Breaking.Bad.S01E02.1080p.BluRay.mkv"),
                ],
            )],
        ),
        MediaNode::file("Avatar.2009.1080p.BluRay.x264-YIFY.mkv"),
    ]
}

#[tokio::test]
async fn library_tree_enriched_via_local_provider() {
    let config = EnrichmentConfig::default();
    let registry = Arc::new(ProviderRegistry::with_builtins(&config).unwrap());

    // Only zero-auth providers are enabled without credentials.
    assert!(registry.is_enabled("local"));
    assert!(!registry.is_enabled("tmdb"));
    assert!(!registry.is_enabled("omdb"));

    let items: Vec<_> = library().iter().flat_map(scan::enumerate).collect();
    assert_eq!(items.len(), 5);

    let (enricher, mut events) = Enricher::new(registry, config);
    enricher.run(items).await;

    let cache = enricher.cache();
    for key in [
        "show:Breaking Bad:2008",
        "season:Breaking Bad:2008:1",
        "episode:Breaking Bad:2008:1:1",
        "episode:Breaking Bad:2008:1:2",
        "movie:Avatar:2009",
    ] {
        let record = cache.get(key).unwrap_or_else(|| panic!("missing {key}"));
        assert_eq!(record.source_of("title"), Some("local"), "key {key}");
        // Every populated core field carries a source.
        for field in record.core.populated_fields() {
            assert!(record.source_of(field).is_some(), "{key}: {field}");
        }
    }

    let episode = cache.get("episode:Breaking Bad:2008:1:2").unwrap();
    assert_eq!(episode.core.media_kind, MediaKind::Episode);
    assert_eq!(episode.core.season_number, 1);
    assert_eq!(episode.core.episode_number, 2);
    assert_eq!(episode.core.year, Some(2008));

    assert!(enricher.failures().is_empty());
    assert!(enricher.err().is_none());
    assert_eq!(enricher.processed_items(), 5);

    let summary = events.summary.borrow_and_update().clone();
    assert!(summary.done);
    assert_eq!(summary.total_items, 5);
}

#[tokio::test]
async fn registry_builtin_ordering() {
    let config = EnrichmentConfig::default();
    let registry = ProviderRegistry::with_builtins(&config).unwrap();
    // Descending priority: tmdb (100), omdb (80), ffprobe (10), local (0).
    assert_eq!(registry.list(), vec!["tmdb", "omdb", "ffprobe", "local"]);
}

#[tokio::test]
async fn configured_catalogs_can_be_enabled() {
    let mut config = EnrichmentConfig::default();
    config.providers.tmdb.api_key = Some("test-key".to_string());
    config.providers.tmdb.enabled = true;

    let registry = ProviderRegistry::with_builtins(&config).unwrap();
    assert!(registry.is_enabled("tmdb"));
    // Catalog without a key stays disabled and refuses to enable.
    assert!(!registry.is_enabled("omdb"));
    assert!(registry.enable("omdb").is_err());
}
