//! End-to-end pipeline tests with scripted stub providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mediatidy::config::EnrichmentConfig;
use mediatidy::metadata::provider::{
    ConfigField, Provider, ProviderCapabilities, ProviderOptions, TemplateVariable,
};
use mediatidy::metadata::registry::ProviderRegistry;
use mediatidy::metadata::types::{FetchRequest, Metadata, MetadataItem};
use mediatidy::pipeline::progress::EnrichmentEvent;
use mediatidy::pipeline::Enricher;
use mediatidy::{fingerprint, ErrorCode, FetchError, MediaKind, Phase, ProviderError};
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// One observed provider call.
#[derive(Debug, Clone, PartialEq)]
struct CallRecord {
    kind: MediaKind,
    name: String,
    id: Option<String>,
    season: u16,
    episode: u16,
}

type Behavior = Box<dyn Fn(&FetchRequest) -> Result<Metadata, ProviderError> + Send + Sync>;

/// A provider whose responses are scripted by the test.
struct ScriptedProvider {
    provider_name: &'static str,
    requires_auth: bool,
    priority: i32,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<CallRecord>>>,
    behavior: Behavior,
}

impl ScriptedProvider {
    fn new(
        name: &'static str,
        behavior: impl Fn(&FetchRequest) -> Result<Metadata, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            provider_name: name,
            requires_auth: false,
            priority: 50,
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            behavior: Box::new(behavior),
        }
    }

    fn with_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> Arc<Mutex<Vec<CallRecord>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &'static str {
        self.provider_name
    }

    fn description(&self) -> &'static str {
        "scripted test provider"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            media_kinds: vec![
                MediaKind::Movie,
                MediaKind::Show,
                MediaKind::Season,
                MediaKind::Episode,
            ],
            requires_auth: self.requires_auth,
            priority: self.priority,
        }
    }

    fn supported_variables(&self) -> Vec<TemplateVariable> {
        Vec::new()
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        Vec::new()
    }

    fn configure(&self, _options: &ProviderOptions) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        request: &FetchRequest,
    ) -> Result<Metadata, FetchError> {
        self.calls.lock().unwrap().push(CallRecord {
            kind: request.media_kind,
            name: request.name.clone(),
            id: request.id.clone(),
            season: request.season,
            episode: request.episode,
        });
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        (self.behavior)(request).map_err(FetchError::from)
    }
}

/// A record a scripted behavior can hand back.
fn show_record(title: &str, year: u16, id_kind: &str, id: &str) -> Metadata {
    let mut md = Metadata::new(MediaKind::Show);
    md.core.title = title.to_string();
    md.core.year = Some(year);
    md.confidence = 0.95;
    md.attribute_core("catalog");
    md.ids.insert(id_kind.to_string(), id.to_string());
    md
}

fn simple_record(request: &FetchRequest, provider: &str) -> Metadata {
    let mut md = Metadata::new(request.media_kind);
    md.core.title = request.name.clone();
    md.core.year = request.year;
    md.core.season_number = request.season;
    md.core.episode_number = request.episode;
    md.confidence = 0.9;
    md.attribute_core(provider);
    md
}

fn movie_item(name: &str, year: u16) -> MetadataItem {
    MetadataItem {
        key: fingerprint(MediaKind::Movie, name, Some(year), 0, 0),
        name: name.to_string(),
        year: Some(year),
        season: 0,
        episode: 0,
        media_kind: MediaKind::Movie,
        phase: Phase::ShowsAndMovies,
        node_path: None,
    }
}

fn episode_item(name: &str, year: u16, season: u16, episode: u16) -> MetadataItem {
    MetadataItem {
        key: fingerprint(MediaKind::Episode, name, Some(year), season, episode),
        name: name.to_string(),
        year: Some(year),
        season,
        episode,
        media_kind: MediaKind::Episode,
        phase: Phase::Episodes,
        node_path: None,
    }
}

fn config(workers: usize) -> EnrichmentConfig {
    EnrichmentConfig {
        worker_count: workers,
        ..EnrichmentConfig::default()
    }
}

fn registry_with(providers: Vec<ScriptedProvider>) -> Arc<ProviderRegistry> {
    let registry = ProviderRegistry::new();
    for provider in providers {
        let name = provider.provider_name;
        let requires_auth = provider.requires_auth;
        let priority = provider.priority;
        registry.register(Arc::new(provider), priority).unwrap();
        if requires_auth {
            registry.configure(name, ProviderOptions::new()).unwrap();
        }
        registry.enable(name).unwrap();
    }
    Arc::new(registry)
}

#[tokio::test]
async fn episode_dependency_fetches_show_first() {
    init_tracing();
    let provider = ScriptedProvider::new("catalog", |request| match request.media_kind {
        MediaKind::Show => Ok(show_record("Test Show", 2020, "tmdb_id", "show-123")),
        MediaKind::Episode => {
            let mut md = simple_record(request, "catalog");
            md.ids
                .insert("tmdb_episode".to_string(), "episode-123".to_string());
            Ok(md)
        }
        _ => Err(ProviderError::not_found("catalog", "unexpected kind")),
    })
    .with_auth()
    .with_priority(100);
    let calls = provider.calls();
    let registry = registry_with(vec![provider]);

    let (enricher, _events) = Enricher::new(registry, config(4));
    enricher
        .run(vec![episode_item("Test Show", 2020, 1, 5)])
        .await;

    // Exactly two provider calls, show first.
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].kind, MediaKind::Show);
    assert_eq!(calls[0].name, "Test Show");
    assert_eq!(calls[1].kind, MediaKind::Episode);
    assert_eq!(calls[1].season, 1);
    assert_eq!(calls[1].episode, 5);
    // Identity carryover from the show record.
    assert_eq!(calls[1].id.as_deref(), Some("show-123"));

    // The show record landed in the cache during dependency resolution.
    let cache = enricher.cache();
    let show = cache.get("show:Test Show:2020").expect("show cached");
    assert_eq!(show.ids["tmdb_id"], "show-123");
    let episode = cache
        .get("episode:Test Show:2020:1:5")
        .expect("episode cached");
    assert_eq!(episode.ids["tmdb_episode"], "episode-123");
    assert!(enricher.err().is_none());
}

#[tokio::test]
async fn phase_barrier_holds_across_item_kinds() {
    let provider = ScriptedProvider::new("catalog", |request| match request.media_kind {
        MediaKind::Show => Ok(show_record("Test Show", 2020, "tmdb_id", "show-1")),
        _ => Ok(simple_record(request, "catalog")),
    })
    .with_auth();
    let calls = provider.calls();
    let registry = registry_with(vec![provider]);

    let season = MetadataItem {
        key: fingerprint(MediaKind::Season, "Test Show", Some(2020), 1, 0),
        name: "Test Show".to_string(),
        year: Some(2020),
        season: 1,
        episode: 0,
        media_kind: MediaKind::Season,
        phase: Phase::Seasons,
        node_path: None,
    };
    let show = MetadataItem {
        key: fingerprint(MediaKind::Show, "Test Show", Some(2020), 0, 0),
        name: "Test Show".to_string(),
        year: Some(2020),
        season: 0,
        episode: 0,
        media_kind: MediaKind::Show,
        phase: Phase::ShowsAndMovies,
        node_path: None,
    };
    // Deliberately out of order; the scheduler partitions by phase.
    let items = vec![
        episode_item("Test Show", 2020, 1, 1),
        season,
        show,
        episode_item("Test Show", 2020, 1, 2),
    ];

    let (enricher, _events) = Enricher::new(registry, config(8));
    enricher.run(items).await;

    let calls = calls.lock().unwrap();
    let kinds: Vec<MediaKind> = calls.iter().map(|c| c.kind).collect();
    let last_show = kinds.iter().rposition(|k| *k == MediaKind::Show).unwrap();
    let first_season = kinds.iter().position(|k| *k == MediaKind::Season).unwrap();
    let last_season = kinds.iter().rposition(|k| *k == MediaKind::Season).unwrap();
    let first_episode = kinds.iter().position(|k| *k == MediaKind::Episode).unwrap();
    assert!(last_show < first_season, "calls: {kinds:?}");
    assert!(last_season < first_episode, "calls: {kinds:?}");

    // The phase-0 show fetch satisfied every dependency: one show call only.
    assert_eq!(
        kinds.iter().filter(|k| **k == MediaKind::Show).count(),
        1,
        "calls: {kinds:?}"
    );
    assert_eq!(enricher.processed_items(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_stops_dispatch_and_delivers_done() {
    init_tracing();
    let provider = ScriptedProvider::new("slow", |request| Ok(simple_record(request, "slow")))
        .with_delay(Duration::from_millis(50));
    let registry = registry_with(vec![provider]);

    let items: Vec<MetadataItem> = (0..1000)
        .map(|i| movie_item(&format!("Movie {i}"), 2000))
        .collect();

    let workers = 20;
    let (enricher, mut events) = Enricher::new(registry, config(workers));
    let enricher = Arc::new(enricher);

    let run = {
        let enricher = enricher.clone();
        tokio::spawn(async move { enricher.run(items).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    let at_cancel = enricher.processed_items();
    enricher.cancel();

    // A Done event arrives within bounded time after cancellation.
    let done = tokio::time::timeout(Duration::from_millis(500), async {
        while let Some(event) = events.events.recv().await {
            if matches!(event, EnrichmentEvent::Done) {
                return true;
            }
        }
        false
    })
    .await
    .expect("Done event within 500ms of cancellation");
    assert!(done);
    run.await.unwrap();

    // At most one in-flight item per worker completed after the snapshot.
    let processed = enricher.processed_items();
    assert!(
        processed <= at_cancel + workers,
        "processed {processed} > {at_cancel} + {workers}"
    );
    assert!(processed < 1000);

    // No cache writes after the pipeline returned.
    let frozen = enricher.cache().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(enricher.cache().len(), frozen);
}

#[tokio::test]
async fn failure_taxonomy_is_honored() {
    let provider = ScriptedProvider::new("moody", |request| match request.name.as_str() {
        "Broken" => Err(ProviderError::unknown("moody", "exploded")),
        "Missing" => Err(ProviderError::not_found("moody", "no match")),
        _ => Ok(simple_record(request, "moody")),
    });
    let registry = registry_with(vec![provider]);

    let (enricher, _events) = Enricher::new(registry, config(2));
    enricher
        .run(vec![
            movie_item("Broken", 2001),
            movie_item("Missing", 2002),
            movie_item("Fine", 2003),
        ])
        .await;

    // NOT_FOUND is silently dropped; UNKNOWN is recorded but not fatal.
    let failures = enricher.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].provider, "moody");
    assert_eq!(failures[0].error.code, ErrorCode::Unknown);
    assert_eq!(failures[0].attempts, 1);
    assert!(enricher.err().is_none());

    let cache = enricher.cache();
    assert!(cache.contains("movie:Fine:2003"));
    assert!(!cache.contains("movie:Broken:2001"));
    assert!(!cache.contains("movie:Missing:2002"));
    assert_eq!(enricher.processed_items(), 3);
}

#[tokio::test]
async fn auth_failures_are_fatal_in_aggregate() {
    let bad_auth = ScriptedProvider::new("locked", |_| {
        Err(ProviderError::auth_failed("locked", "key revoked"))
    })
    .with_priority(90);
    let good = ScriptedProvider::new("open", |request| Ok(simple_record(request, "open")))
        .with_priority(10);
    let registry = registry_with(vec![bad_auth, good]);

    let (enricher, _events) = Enricher::new(registry, config(2));
    enricher.run(vec![movie_item("Avatar", 2009)]).await;

    // The phase continued: the healthy provider still produced output.
    assert!(enricher.cache().contains("movie:Avatar:2009"));

    // But the aggregate is fatal.
    let fatal = enricher.err().expect("AUTH_FAILED must be fatal");
    assert_eq!(fatal.code, ErrorCode::AuthFailed);
}

#[tokio::test]
async fn dispatcher_skips_keys_already_cached() {
    let provider = ScriptedProvider::new("catalog", |request| Ok(simple_record(request, "catalog")));
    let calls = provider.calls();
    let registry = registry_with(vec![provider]);

    let (enricher, _events) = Enricher::new(registry, config(1));
    enricher.run(vec![movie_item("Avatar", 2009)]).await;
    assert_eq!(calls.lock().unwrap().len(), 1);

    // Same item again: the cache is authoritative, the dispatcher skips it
    // and still counts it as processed.
    enricher.run(vec![movie_item("Avatar", 2009)]).await;
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(enricher.processed_items(), 1);
}

#[tokio::test]
async fn merges_providers_by_priority_with_sources() {
    let primary = ScriptedProvider::new("primary", |request| {
        let mut md = simple_record(request, "primary");
        md.core.overview = String::new();
        md.ids.insert("tmdb_id".to_string(), "p-1".to_string());
        Ok(md)
    })
    .with_priority(100);
    let secondary = ScriptedProvider::new("secondary", |request| {
        let mut md = simple_record(request, "secondary");
        md.core.overview = "From the secondary catalog.".to_string();
        md.attribute_core("secondary");
        Ok(md)
    })
    .with_priority(10);
    let registry = registry_with(vec![primary, secondary]);

    let (enricher, _events) = Enricher::new(registry, config(2));
    enricher.run(vec![movie_item("Avatar", 2009)]).await;

    let record = enricher.cache().get("movie:Avatar:2009").unwrap();
    assert_eq!(record.source_of("title"), Some("primary"));
    assert_eq!(record.core.overview, "From the secondary catalog.");
    assert_eq!(record.source_of("overview"), Some("secondary"));
    assert_eq!(record.ids["tmdb_id"], "p-1");
}

#[tokio::test]
async fn retry_resolves_failure_with_corrected_query() {
    let provider = ScriptedProvider::new("catalog", |request| {
        if request.name == "Teh Matrix" {
            Err(ProviderError::unknown("catalog", "gibberish query"))
        } else {
            let mut md = simple_record(request, "catalog");
            md.core.overview = "A hacker learns the truth.".to_string();
            md.attribute_core("catalog");
            Ok(md)
        }
    });
    let registry = registry_with(vec![provider]);

    let (enricher, mut events) = Enricher::new(registry, config(2));
    let item = movie_item("Teh Matrix", 1999);
    let key = item.key.clone();
    enricher.run(vec![item]).await;
    assert_eq!(enricher.failures().len(), 1);

    let mut retry = enricher.retry_controller();
    assert_eq!(retry.remaining(), 1);
    assert_eq!(retry.selected().unwrap().query, "Teh Matrix");

    let cancel = CancellationToken::new();
    let outcome = retry
        .retry_provider(&cancel, &key, "catalog", "The Matrix")
        .await
        .unwrap();
    assert!(outcome.is_none(), "retry should resolve the failure");
    assert!(retry.is_empty());

    // The resolved record is cached under the item's original key.
    let record = enricher.cache().get(&key).expect("record after retry");
    assert_eq!(record.core.overview, "A hacker learns the truth.");

    // The event stream reported the resolution.
    let mut resolved = false;
    while let Ok(event) = events.events.try_recv() {
        if let EnrichmentEvent::ItemResolved { key: k, provider } = event {
            assert_eq!(k, key);
            assert_eq!(provider, "catalog");
            resolved = true;
        }
    }
    assert!(resolved, "ItemResolved event expected");
}

#[tokio::test]
async fn retry_failure_updates_attempts() {
    let provider = ScriptedProvider::new("catalog", |_| {
        Err(ProviderError::unavailable("catalog", "still down"))
    });
    let registry = registry_with(vec![provider]);

    let (enricher, _events) = Enricher::new(registry, config(1));
    let item = movie_item("Avatar", 2009);
    let key = item.key.clone();
    enricher.run(vec![item]).await;

    let mut retry = enricher.retry_controller();
    let cancel = CancellationToken::new();
    let failure = retry
        .retry_provider(&cancel, &key, "catalog", "Avatar (2009)")
        .await
        .unwrap()
        .expect("retry should fail again");
    assert_eq!(failure.attempts, 2);
    assert_eq!(failure.error.code, ErrorCode::Unavailable);
    assert_eq!(failure.query, "Avatar (2009)");
    assert_eq!(retry.remaining(), 1);
}

#[tokio::test]
async fn skip_dismisses_without_retry() {
    let provider = ScriptedProvider::new("catalog", |_| {
        Err(ProviderError::unknown("catalog", "nope"))
    });
    let registry = registry_with(vec![provider]);

    let (enricher, _events) = Enricher::new(registry, config(1));
    enricher
        .run(vec![movie_item("A", 2001), movie_item("B", 2002)])
        .await;

    let mut retry = enricher.retry_controller();
    assert_eq!(retry.remaining(), 2);
    retry.skip();
    assert_eq!(retry.remaining(), 1);
    assert_eq!(retry.failures().len(), 2);
    assert!(retry.failures().iter().any(|f| f.dismissed));
}

#[tokio::test]
async fn summary_reports_done_after_drain() {
    let provider = ScriptedProvider::new("catalog", |request| Ok(simple_record(request, "catalog")));
    let registry = registry_with(vec![provider]);

    let (enricher, mut events) = Enricher::new(registry, config(2));
    enricher
        .run(vec![movie_item("A", 2001), movie_item("B", 2002)])
        .await;

    let summary = events.summary.borrow().clone();
    assert!(summary.done);
    assert_eq!(summary.total_items, 2);
    assert_eq!(summary.processed_items, 2);
    assert_eq!(summary.worker_limit, 2);
    assert_eq!(summary.active_providers, vec!["catalog".to_string()]);

    // ItemStarted events precede Done, one per processed item.
    let mut started = 0;
    let mut done = false;
    while let Ok(event) = events.events.try_recv() {
        match event {
            EnrichmentEvent::ItemStarted { .. } => {
                assert!(!done, "ItemStarted after Done");
                started += 1;
            }
            EnrichmentEvent::Done => done = true,
            _ => {}
        }
    }
    assert!(done);
    assert_eq!(started, 2);
}

#[tokio::test]
async fn rate_limited_dependency_propagates_backpressure() {
    // A provider that always reports rate limiting: the dependency fetch
    // fails, so the episode fetch is never attempted for that provider.
    let provider = ScriptedProvider::new("throttled", |request| match request.media_kind {
        MediaKind::Show => Err(ProviderError::rate_limited("throttled", "slow down", 30)),
        _ => Ok(simple_record(request, "throttled")),
    })
    .with_auth();
    let calls = provider.calls();
    let registry = registry_with(vec![provider]);

    let (enricher, _events) = Enricher::new(registry, config(1));
    enricher
        .run(vec![episode_item("Test Show", 2020, 1, 1)])
        .await;

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1, "only the show lookup should run");
    assert_eq!(calls[0].kind, MediaKind::Show);

    let failures = enricher.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].error.code, ErrorCode::RateLimited);
    assert!(!enricher.cache().contains("episode:Test Show:2020:1:1"));
}

/// Tracks concurrently active fetches to prove the pool bound holds.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_pool_respects_limit() {
    static ACTIVE: AtomicUsize = AtomicUsize::new(0);
    static PEAK: AtomicUsize = AtomicUsize::new(0);

    struct CountingProvider;

    #[async_trait]
    impl Provider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn description(&self) -> &'static str {
            "counts concurrent fetches"
        }
        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities {
                media_kinds: vec![MediaKind::Movie],
                requires_auth: false,
                priority: 0,
            }
        }
        fn supported_variables(&self) -> Vec<TemplateVariable> {
            Vec::new()
        }
        fn config_schema(&self) -> Vec<ConfigField> {
            Vec::new()
        }
        fn configure(&self, _options: &ProviderOptions) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn fetch(
            &self,
            _cancel: &CancellationToken,
            request: &FetchRequest,
        ) -> Result<Metadata, FetchError> {
            let now = ACTIVE.fetch_add(1, Ordering::SeqCst) + 1;
            PEAK.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            ACTIVE.fetch_sub(1, Ordering::SeqCst);
            let mut md = Metadata::new(request.media_kind);
            md.core.title = request.name.clone();
            md.attribute_core("counting");
            md.confidence = 0.5;
            Ok(md)
        }
    }

    let registry = ProviderRegistry::new();
    registry.register(Arc::new(CountingProvider), 0).unwrap();
    registry.enable("counting").unwrap();

    let items: Vec<MetadataItem> = (0..60)
        .map(|i| movie_item(&format!("M{i}"), 2000))
        .collect();
    let (enricher, _events) = Enricher::new(Arc::new(registry), config(4));
    enricher.run(items).await;

    assert_eq!(enricher.processed_items(), 60);
    assert!(
        PEAK.load(Ordering::SeqCst) <= 4,
        "peak concurrency {} exceeded the worker limit",
        PEAK.load(Ordering::SeqCst)
    );
}
