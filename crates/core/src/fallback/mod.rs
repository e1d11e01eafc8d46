//! Record-backed fallback for hosts without the worker runtime.
//!
//! The controller reproduces both strategies as a [`RequestInterceptor`] over
//! its own record namespace, precaches the manifest sequentially, keeps the
//! namespace under its size ceiling and follows online/offline transitions.
//! Manifest media go to a separate [`MediaCache`] and are served in the
//! variant matching the measured network quality.

pub mod connectivity;
pub mod preload;
pub mod probe;

pub use connectivity::{Connectivity, MemoryNavigator, Navigator, OfflineRedirector};
pub use preload::{MEDIA_STORE, MediaCache, PreloadOutcome, QueuedMedia, quality_variant};
pub use probe::{NetworkQuality, QualityProbe, classify};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use url::Url;

use crate::Error;
use crate::cache::{EvictionPolicy, RecordStore, ResourceRecord};
use crate::http::{Method, Network, Request};
use crate::intercept::{RequestInterceptor, pass_through};
use crate::store::{ReadyHandle, RetryPolicy};
use crate::strategy::{Admission, RoutePolicy, Served, Source, StrategyContext};
use crate::sync_queue::{NoteQueue, SyncOutcome};
use crate::worker::Manifest;

/// Prefix of the fallback record namespace.
pub const FALLBACK_STORE_PREFIX: &str = "offline-resources-v";

/// Namespace name for a fallback store version, e.g. `offline-resources-v1.0`.
pub fn fallback_store_name(version: &str) -> String {
    format!("{FALLBACK_STORE_PREFIX}{version}")
}

#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub origin: Url,
    pub offline_path: String,
    pub manifest: Manifest,
    pub routes: RoutePolicy,
    pub eviction: EvictionPolicy,
}

impl FallbackConfig {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            offline_path: "/offline.html".to_string(),
            manifest: Manifest::default(),
            routes: RoutePolicy::fallback_default(),
            eviction: EvictionPolicy::default(),
        }
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = manifest;
        self
    }
}

/// Outcome of a sequential precache pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PrecacheReport {
    pub total: usize,
    /// Newly stored plus already present.
    pub cached: usize,
    pub skipped: usize,
    pub failed: Vec<String>,
}

/// What an online/offline transition triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TransitionReport {
    pub online: bool,
    pub navigated: bool,
    pub quality: NetworkQuality,
    pub precache: Option<PrecacheReport>,
    pub sync: Option<SyncOutcome>,
}

pub struct FallbackController {
    store: ReadyHandle<RecordStore>,
    network: Arc<dyn Network>,
    connectivity: Connectivity,
    redirector: Arc<OfflineRedirector>,
    probe: Arc<QualityProbe>,
    media: Arc<MediaCache>,
    notes: Arc<NoteQueue>,
    config: FallbackConfig,
    offline_url: String,
    first_load: AtomicBool,
}

impl FallbackController {
    pub fn new(
        store: ReadyHandle<RecordStore>, media_store: RecordStore, network: Arc<dyn Network>,
        connectivity: Connectivity, navigator: Arc<dyn Navigator>, notes: Arc<NoteQueue>, config: FallbackConfig,
    ) -> Result<Self, Error> {
        let offline_url = config
            .origin
            .join(&config.offline_path)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.offline_path)))?
            .to_string();
        let redirector =
            Arc::new(OfflineRedirector::new(connectivity.clone(), navigator, config.offline_path.clone()));
        let probe = Arc::new(QualityProbe::new(Arc::clone(&network), config.origin.clone(), connectivity.clone()));
        let media = Arc::new(MediaCache::new(
            media_store,
            Arc::clone(&network),
            Arc::clone(&probe),
            connectivity.clone(),
            config.eviction,
        ));
        Ok(Self {
            store,
            network,
            connectivity,
            redirector,
            probe,
            media,
            notes,
            config,
            offline_url,
            first_load: AtomicBool::new(true),
        })
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn probe(&self) -> Arc<QualityProbe> {
        Arc::clone(&self.probe)
    }

    pub fn redirector(&self) -> Arc<OfflineRedirector> {
        Arc::clone(&self.redirector)
    }

    pub fn media(&self) -> Arc<MediaCache> {
        Arc::clone(&self.media)
    }

    async fn store(&self) -> Result<RecordStore, Error> {
        self.store.acquire(RetryPolicy::acquire()).await
    }

    /// First start: redirect if offline, then precache when the store is
    /// empty or this is the first load.
    /// Manifest media are queued for background preload afterwards.
    pub async fn init(&self) -> Result<PrecacheReport, Error> {
        self.redirector.check_and_redirect();
        let store = self.store().await?;
        let empty = store.count().await? == 0;
        let first_load = self.first_load.swap(false, Ordering::SeqCst);
        let report = if empty || first_load {
            self.precache().await?
        } else {
            tracing::info!("fallback store already populated, skipping precache");
            PrecacheReport::default()
        };
        self.preload_media();
        Ok(report)
    }

    /// Queue the manifest's `.mp4` entries on the media cache, earlier
    /// entries first. Nothing is queued while offline.
    pub fn preload_media(&self) -> usize {
        if !self.connectivity.is_online() {
            return 0;
        }
        let urls = match self.config.manifest.resolve(&self.config.origin) {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!(error = %e, "manifest resolve failed, no media preload");
                return 0;
            }
        };
        let media: Vec<Url> = urls.into_iter().filter(is_media).collect();
        let total = media.len();
        for (i, url) in media.iter().enumerate() {
            self.media.preload(url.as_str(), (total - i) as u32);
        }
        if total > 0 {
            tracing::info!(count = total, "media preload queued");
        }
        total
    }

    /// Cache every manifest URL one after another, skipping stored ones.
    pub async fn precache(&self) -> Result<PrecacheReport, Error> {
        let store = self.store().await?;
        let urls = self.config.manifest.resolve(&self.config.origin)?;
        let mut report = PrecacheReport { total: urls.len(), ..Default::default() };

        for url in urls {
            match self.cache_resource(&store, &url).await {
                Ok(true) => report.cached += 1,
                Ok(false) => {
                    report.cached += 1;
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "precache failed");
                    report.failed.push(url.to_string());
                }
            }
        }

        self.evict(&store).await;
        tracing::info!(cached = report.cached, total = report.total, "fallback precache complete");
        Ok(report)
    }

    /// Returns false when the URL was already stored.
    async fn cache_resource(&self, store: &RecordStore, url: &Url) -> Result<bool, Error> {
        if store.contains(url.as_str()).await? {
            tracing::debug!(url = %url, "already cached, skipping");
            return Ok(false);
        }
        let response = self.network.fetch(&Request::get(url.clone())).await?;
        if !response.is_success() {
            return Err(Error::HttpError(format!("{url}: status {}", response.status)));
        }
        store.put_record(&ResourceRecord::new(url.as_str(), response.body, response.headers)).await?;
        Ok(true)
    }

    async fn evict(&self, store: &RecordStore) {
        if let Err(e) = store.evict(self.config.eviction).await {
            tracing::warn!(store = store.name(), error = %e, "eviction failed");
        }
    }

    /// Route one request. Failures inside the strategy degrade to a plain
    /// network request.
    pub async fn handle_fetch(&self, request: Request) -> Result<Served, Error> {
        if !self.connectivity.is_online() && request.accepts_html() {
            self.redirector.check_and_redirect();
        }
        if request.method != Method::Get || !request.is_same_origin(&self.config.origin) {
            return pass_through(self.network.as_ref(), &request).await;
        }
        if is_media(&request.url) {
            if let Some(served) = self.serve_media(&request.url).await {
                return Ok(served);
            }
        }

        let store = match self.store().await {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(error = %e, "fallback store unavailable, passing through");
                return pass_through(self.network.as_ref(), &request).await;
            }
        };

        let strategy = self.config.routes.strategy_for(&request.url);
        let ctx = StrategyContext {
            cache: &store,
            network: self.network.as_ref(),
            offline_url: &self.offline_url,
            admission: Admission::Success,
        };
        match ctx.run(strategy, &request).await {
            Ok(served) => {
                if served.source == Source::Network && served.response.is_success() {
                    self.evict(&store).await;
                }
                Ok(served)
            }
            Err(e) => {
                tracing::warn!(url = %request.url, %strategy, error = %e, "interceptor failed, passing through");
                pass_through(self.network.as_ref(), &request).await
            }
        }
    }

    /// The quality variant of a media URL, then the original, from the media
    /// cache or the network. None sends the request down the normal route.
    async fn serve_media(&self, url: &Url) -> Option<Served> {
        let original = url.as_str();
        let variant = quality_variant(original, self.probe.quality(), self.connectivity.is_online());
        let mut candidates = vec![variant];
        if candidates[0] != original {
            candidates.push(original.to_string());
        }

        for candidate in candidates {
            let cached = matches!(self.media.store().contains(&candidate).await, Ok(true));
            match self.media.fetch_media(&candidate).await {
                Ok(record) => {
                    let source = if cached { Source::Cache } else { Source::Network };
                    return Some(Served::new(record.into_response(), source));
                }
                Err(e) => tracing::debug!(url = %candidate, error = %e, "media candidate unavailable"),
            }
        }
        None
    }

    /// Connectivity came back.
    pub async fn on_online(&self) -> TransitionReport {
        self.connectivity.set_online(true);
        tracing::info!("online");
        let navigated = self.redirector.return_from_offline();
        let quality = self.probe.probe().await;

        let empty = match self.store().await {
            Ok(store) => matches!(store.count().await, Ok(0)),
            Err(_) => false,
        };
        let precache = if empty {
            match self.precache().await {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::warn!(error = %e, "precache after reconnect failed");
                    None
                }
            }
        } else {
            None
        };

        self.preload_media();

        let sync = match self.notes.sync().await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(error = %e, "note sync after reconnect failed");
                None
            }
        };

        TransitionReport { online: true, navigated, quality, precache, sync }
    }

    /// Connectivity was lost.
    pub fn on_offline(&self) -> TransitionReport {
        self.connectivity.set_online(false);
        tracing::info!("offline");
        self.probe.set_quality(NetworkQuality::Poor);
        let navigated = self.redirector.check_and_redirect();
        TransitionReport { online: false, navigated, quality: NetworkQuality::Poor, precache: None, sync: None }
    }

    /// Start the offline poll and the quality probe loops.
    pub fn spawn_background(&self, poll: Duration, probe: Duration) -> Vec<JoinHandle<()>> {
        vec![self.redirector().spawn_poll(poll), self.probe().spawn_loop(probe)]
    }
}

fn is_media(url: &Url) -> bool {
    url.path().ends_with(".mp4")
}

#[async_trait::async_trait]
impl RequestInterceptor for FallbackController {
    async fn intercept(&self, request: Request) -> Result<Served, Error> {
        self.handle_fetch(request).await
    }

    fn mode(&self) -> &'static str {
        "fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResourceCache;
    use crate::http::Response;
    use crate::store::LocalDb;
    use crate::sync_queue::LocalStubRemote;
    use crate::testing::{FakeNetwork, ORIGIN, url};

    struct Setup {
        db: LocalDb,
        network: Arc<FakeNetwork>,
        navigator: Arc<MemoryNavigator>,
        notes: Arc<NoteQueue>,
        controller: FallbackController,
    }

    async fn setup(network: FakeNetwork, manifest: &[&str]) -> Setup {
        let db = LocalDb::open_in_memory().await.unwrap();
        let network = Arc::new(network);
        let navigator = Arc::new(MemoryNavigator::new("/index.html"));
        let notes = Arc::new(NoteQueue::new(db.clone(), Arc::new(LocalStubRemote)));
        let store = ReadyHandle::ready("fallback store", db.record_store(&fallback_store_name("1.0")));
        let config = FallbackConfig::new(Url::parse(ORIGIN).unwrap()).with_manifest(Manifest::new(manifest.iter().copied()));
        let controller = FallbackController::new(
            store,
            db.record_store(MEDIA_STORE),
            network.clone(),
            Connectivity::new(true),
            navigator.clone(),
            notes.clone(),
            config,
        )
        .unwrap();
        Setup { db, network, navigator, notes, controller }
    }

    fn site() -> FakeNetwork {
        FakeNetwork::new()
            .route("/index.html", Response::ok("", "<html>shell</html>"))
            .route("/offline.html", Response::ok("", "<html>offline</html>"))
            .route("/video/1.mp4", Response::ok("", vec![7u8; 16]))
    }

    fn records(db: &LocalDb) -> RecordStore {
        db.record_store("offline-resources-v1.0")
    }

    #[test]
    fn test_store_name() {
        assert_eq!(fallback_store_name("1.0"), "offline-resources-v1.0");
    }

    #[tokio::test]
    async fn test_init_precaches_sequentially() {
        let s = setup(site(), &["/index.html", "/offline.html", "/missing.css"]).await;
        let report = s.controller.init().await.unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.cached, 2);
        assert_eq!(report.failed, vec![url("/missing.css").to_string()]);
        assert_eq!(
            s.network.requested(),
            vec!["/index.html".to_string(), "/offline.html".to_string(), "/missing.css".to_string()]
        );
        assert_eq!(records(&s.db).count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_precache_skips_cached_urls() {
        let s = setup(site(), &["/index.html", "/offline.html"]).await;
        s.controller.init().await.unwrap();
        let calls = s.network.calls();

        let report = s.controller.precache().await.unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.cached, 2);
        assert_eq!(s.network.calls(), calls);
    }

    #[tokio::test]
    async fn test_second_init_with_populated_store_skips() {
        let s = setup(site(), &["/index.html"]).await;
        s.controller.init().await.unwrap();
        let report = s.controller.init().await.unwrap();
        assert_eq!(report, PrecacheReport::default());
    }

    #[tokio::test]
    async fn test_static_resources_cache_first() {
        let s = setup(site(), &[]).await;
        let req = Request::get(url("/video/1.mp4"));

        assert_eq!(s.controller.handle_fetch(req.clone()).await.unwrap().source, Source::Network);
        assert_eq!(s.controller.handle_fetch(req).await.unwrap().source, Source::Cache);
        assert_eq!(s.network.calls(), 1);
    }

    #[tokio::test]
    async fn test_api_network_first_with_cache_fallback() {
        let network = site().route("/api/feed", Response::ok("", "{\"n\":1}"));
        let s = setup(network, &[]).await;
        let req = Request::get(url("/api/feed"));
        s.controller.handle_fetch(req.clone()).await.unwrap();

        s.network.set_online(false);
        let served = s.controller.handle_fetch(req).await.unwrap();
        assert_eq!(served.source, Source::Cache);
        assert_eq!(served.response.status, 200);
        assert_eq!(served.response.body, b"{\"n\":1}");
    }

    #[tokio::test]
    async fn test_offline_html_gets_offline_page_and_redirects() {
        let s = setup(site(), &["/offline.html"]).await;
        s.controller.init().await.unwrap();
        s.network.set_online(false);
        s.controller.connectivity().set_online(false);

        let served = s.controller.handle_fetch(Request::navigate(url("/about.html"))).await.unwrap();
        assert_eq!(served.source, Source::OfflinePage);
        assert_eq!(served.response.body, b"<html>offline</html>");
        assert_eq!(s.navigator.current(), "/offline.html");
    }

    #[tokio::test]
    async fn test_strategy_failure_degrades_to_network_error() {
        let s = setup(site(), &[]).await;
        s.network.set_online(false);
        let result = s.controller.handle_fetch(Request::get(url("/video/9.mp4"))).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_unready_store_passes_through() {
        let db = LocalDb::open_in_memory().await.unwrap();
        let network = Arc::new(site());
        let notes = Arc::new(NoteQueue::new(db.clone(), Arc::new(LocalStubRemote)));
        let controller = FallbackController::new(
            ReadyHandle::new("fallback store"),
            db.record_store(MEDIA_STORE),
            network,
            Connectivity::new(true),
            Arc::new(MemoryNavigator::new("/")),
            notes,
            FallbackConfig::new(Url::parse(ORIGIN).unwrap()),
        )
        .unwrap();

        let served = controller.handle_fetch(Request::get(url("/index.html"))).await.unwrap();
        assert_eq!(served.source, Source::Passthrough);
    }

    #[tokio::test]
    async fn test_eviction_after_put() {
        let network = FakeNetwork::new()
            .route("/a.css", Response::ok("", vec![0u8; 60]))
            .route("/b.css", Response::ok("", vec![0u8; 60]));
        let db = LocalDb::open_in_memory().await.unwrap();
        let notes = Arc::new(NoteQueue::new(db.clone(), Arc::new(LocalStubRemote)));
        let mut config = FallbackConfig::new(Url::parse(ORIGIN).unwrap());
        config.eviction = EvictionPolicy::new(100, 0.7);
        let controller = FallbackController::new(
            ReadyHandle::ready("fallback store", records(&db)),
            db.record_store(MEDIA_STORE),
            Arc::new(network),
            Connectivity::new(true),
            Arc::new(MemoryNavigator::new("/")),
            notes,
            config,
        )
        .unwrap();

        controller.handle_fetch(Request::get(url("/a.css"))).await.unwrap();
        controller.handle_fetch(Request::get(url("/b.css"))).await.unwrap();

        let store = records(&db);
        assert_eq!(store.total_size().await.unwrap(), 60);
        assert!(store.get(url("/b.css").as_str()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_online_transition_returns_and_syncs() {
        let s = setup(site(), &["/index.html"]).await;
        let offline = s.controller.on_offline();
        assert!(offline.navigated);
        assert_eq!(s.controller.probe().quality(), NetworkQuality::Poor);
        s.notes.save("while offline", false).await.unwrap();

        let online = s.controller.on_online().await;
        assert!(online.navigated);
        assert_eq!(s.navigator.current(), "/index.html");
        assert_eq!(online.precache.map(|p| p.cached), Some(1));
        assert_eq!(online.sync.map(|o| o.marked), Some(1));
        assert!(s.db.get_notes_by_synced(false).await.unwrap().is_empty());
    }

    fn media(db: &LocalDb) -> RecordStore {
        db.record_store(MEDIA_STORE)
    }

    async fn settled(media: &MediaCache) {
        for _ in 0..200 {
            if !media.is_draining() && media.queued().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("media queue never settled");
    }

    #[tokio::test]
    async fn test_media_served_from_media_store() {
        let s = setup(site(), &[]).await;
        let req = Request::get(url("/video/1.mp4"));

        assert_eq!(s.controller.handle_fetch(req.clone()).await.unwrap().source, Source::Network);
        let served = s.controller.handle_fetch(req).await.unwrap();
        assert_eq!(served.source, Source::Cache);
        assert_eq!(served.response.body, vec![7u8; 16]);
        assert!(media(&s.db).contains(url("/video/1.mp4").as_str()).await.unwrap());
        assert_eq!(records(&s.db).count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_media_prefers_quality_variant() {
        let network = site().route("/video/1-medium.mp4", Response::ok("", vec![5u8; 8]));
        let s = setup(network, &[]).await;
        s.controller.probe().set_quality(NetworkQuality::Medium);

        let served = s.controller.handle_fetch(Request::get(url("/video/1.mp4"))).await.unwrap();
        assert_eq!(served.response.body, vec![5u8; 8]);
        assert!(media(&s.db).contains(url("/video/1-medium.mp4").as_str()).await.unwrap());
    }

    #[tokio::test]
    async fn test_media_missing_variant_falls_back_to_original() {
        let s = setup(site(), &[]).await;
        s.controller.probe().set_quality(NetworkQuality::Medium);

        let served = s.controller.handle_fetch(Request::get(url("/video/1.mp4"))).await.unwrap();
        assert_eq!(served.source, Source::Network);
        assert_eq!(served.response.body, vec![7u8; 16]);
        assert!(!media(&s.db).contains(url("/video/1-medium.mp4").as_str()).await.unwrap());
    }

    #[tokio::test]
    async fn test_offline_media_uses_cached_original() {
        let s = setup(site(), &[]).await;
        s.controller.handle_fetch(Request::get(url("/video/1.mp4"))).await.unwrap();
        s.network.set_online(false);
        s.controller.on_offline();
        let calls = s.network.calls();

        let served = s.controller.handle_fetch(Request::get(url("/video/1.mp4"))).await.unwrap();
        assert_eq!(served.source, Source::Cache);
        assert_eq!(s.network.calls(), calls);
    }

    #[tokio::test]
    async fn test_init_preloads_manifest_media() {
        let s = setup(site(), &["/index.html", "/video/1.mp4"]).await;
        s.controller.init().await.unwrap();
        settled(&s.controller.media()).await;

        assert!(media(&s.db).contains(url("/video/1.mp4").as_str()).await.unwrap());
    }

    #[tokio::test]
    async fn test_preload_media_skipped_offline() {
        let s = setup(site(), &["/video/1.mp4"]).await;
        s.controller.connectivity().set_online(false);
        assert_eq!(s.controller.preload_media(), 0);
        assert!(s.controller.media().queued().is_empty());
    }

    #[tokio::test]
    async fn test_mode() {
        let s = setup(site(), &[]).await;
        assert_eq!(s.controller.mode(), "fallback");
    }
}
