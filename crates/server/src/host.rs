//! The page host.
//!
//! Opens the local database, picks the runtime (caching worker when the
//! runtime supports it, fallback controller otherwise) and puts it in front
//! of the network. Tools talk to the page through this type only.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;

use offline_h5_client::resolve;
use offline_h5_core::fallback::{
    Connectivity, FallbackController, MEDIA_STORE, MemoryNavigator, Navigator, NetworkQuality, TransitionReport,
    fallback_store_name,
};
use offline_h5_core::http::{Method, Network, Request, Response};
use offline_h5_core::store::Note;
use offline_h5_core::sync_queue::{SYNC_TAG, SavedNote, SyncOutcome};
use offline_h5_core::worker::WorkerMessage;
use offline_h5_core::{
    AppConfig, ConfigError, Error, LocalDb, LocalStubRemote, NoteQueue, ReadyHandle, RecordStore, RequestInterceptor,
    RetryPolicy, Served, Source, Worker,
};

/// Client id the page registers with the worker.
pub const PAGE_CLIENT: &str = "page";

const MESSAGE_LOG: usize = 32;

/// Network that fails while the page is offline.
pub struct GatedNetwork {
    inner: Arc<dyn Network>,
    connectivity: Connectivity,
}

impl GatedNetwork {
    pub fn new(inner: Arc<dyn Network>, connectivity: Connectivity) -> Self {
        Self { inner, connectivity }
    }
}

#[async_trait::async_trait]
impl Network for GatedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        if !self.connectivity.is_online() {
            return Err(Error::Network(format!("{}: offline", request.url)));
        }
        self.inner.fetch(request).await
    }
}

/// The runtime answering the page's requests.
pub enum Runtime {
    Worker(Arc<Worker>),
    Fallback(Arc<FallbackController>),
}

impl Runtime {
    fn interceptor(&self) -> &dyn RequestInterceptor {
        match self {
            Runtime::Worker(worker) => worker.as_ref(),
            Runtime::Fallback(controller) => controller.as_ref(),
        }
    }
}

/// A page-side request.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Absolute URL or a path on the page origin.
    pub target: String,
    pub method: Method,
    /// Top-level navigation (the response replaces the page).
    pub navigate: bool,
    pub accept: Option<String>,
}

/// Result of a connectivity change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct NetworkChange {
    pub online: bool,
    /// False when the page was already in that state.
    pub changed: bool,
    /// Background syncs fired by the worker.
    pub syncs: Vec<SyncOutcome>,
    /// What the fallback controller did.
    pub transition: Option<TransitionReport>,
}

/// Record namespace usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StoreUsage {
    pub name: String,
    pub records: u64,
    pub bytes: u64,
}

/// Snapshot of the runtime and its caches.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HostStatus {
    pub mode: String,
    pub online: bool,
    pub location: String,
    pub worker_state: Option<String>,
    pub current_bucket: Option<String>,
    pub current_bucket_entries: Option<u64>,
    pub buckets: Vec<String>,
    pub fallback_store: Option<StoreUsage>,
    pub media_store: Option<StoreUsage>,
    pub quality: Option<NetworkQuality>,
    pub sync_pending: bool,
    pub unsynced_notes: usize,
    /// Latest worker messages, oldest first.
    pub messages: Vec<serde_json::Value>,
}

pub struct Host {
    config: AppConfig,
    origin: Url,
    db: LocalDb,
    notes: Arc<NoteQueue>,
    connectivity: Connectivity,
    navigator: Arc<MemoryNavigator>,
    runtime: Runtime,
    fallback_store: Option<RecordStore>,
    messages: Arc<Mutex<VecDeque<WorkerMessage>>>,
}

impl Host {
    /// Open the configured database and compose the runtime.
    pub async fn open(config: AppConfig, network: Arc<dyn Network>) -> Result<Self, Error> {
        let path = config.db_path.clone();
        let handle = ReadyHandle::new("database");
        let db = handle
            .open_with_retry(RetryPolicy::open(), || LocalDb::open(path.clone()))
            .await?;
        tracing::info!(path = %config.db_path.display(), "database opened");
        Self::with_db(config, db, network)
    }

    /// Compose the runtime over an already open database.
    pub fn with_db(config: AppConfig, db: LocalDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(config_error)?;
        let connectivity = Connectivity::new(true);
        let gated: Arc<dyn Network> = Arc::new(GatedNetwork::new(network, connectivity.clone()));
        let notes = Arc::new(NoteQueue::new(db.clone(), Arc::new(LocalStubRemote)));
        let navigator = Arc::new(MemoryNavigator::new(config.start_path.clone()));
        let messages = Arc::new(Mutex::new(VecDeque::with_capacity(MESSAGE_LOG)));

        let (runtime, fallback_store) = if config.worker_supported {
            let worker_config = config.worker_config().map_err(config_error)?;
            let worker = Worker::new(db.clone(), Arc::clone(&gated), Arc::clone(&notes), worker_config)?;
            let rx = worker.clients().register(PAGE_CLIENT);
            spawn_message_log(rx, Arc::clone(&messages));
            (Runtime::Worker(Arc::new(worker)), None)
        } else {
            let store = db.record_store(&fallback_store_name(&config.fallback_store_version));
            let fallback_config = config.fallback_config().map_err(config_error)?;
            let controller = FallbackController::new(
                ReadyHandle::ready("fallback-store", store.clone()),
                db.record_store(MEDIA_STORE),
                Arc::clone(&gated),
                connectivity.clone(),
                Arc::clone(&navigator) as Arc<dyn Navigator>,
                Arc::clone(&notes),
                fallback_config,
            )?;
            (Runtime::Fallback(Arc::new(controller)), Some(store))
        };

        Ok(Self { config, origin, db, notes, connectivity, navigator, runtime, fallback_store, messages })
    }

    pub fn mode(&self) -> &'static str {
        self.runtime.interceptor().mode()
    }

    /// Bring the runtime up: install then activate, or the first precache.
    pub async fn start(&self) -> Result<(), Error> {
        match &self.runtime {
            Runtime::Worker(worker) => {
                let (install, activate) = worker.start().await?;
                tracing::info!(
                    bucket = %install.bucket,
                    cached = install.cached,
                    failed = install.failed.len(),
                    deleted = activate.deleted_buckets.len(),
                    clients = activate.claimed_clients,
                    "worker active"
                );
            }
            Runtime::Fallback(controller) => {
                let report = controller.init().await?;
                tracing::info!(
                    cached = report.cached,
                    skipped = report.skipped,
                    failed = report.failed.len(),
                    "fallback controller ready"
                );
            }
        }
        Ok(())
    }

    /// Start the periodic loops the runtime needs.
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        match &self.runtime {
            Runtime::Worker(_) => Vec::new(),
            Runtime::Fallback(controller) => {
                controller.spawn_background(self.config.offline_poll(), self.config.probe_interval())
            }
        }
    }

    /// Send a page request through the runtime.
    pub async fn fetch(&self, page: PageRequest) -> Result<Served, Error> {
        let url = resolve(&self.origin, &page.target).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let request = if page.navigate { Request::navigate(url) } else { Request::get(url) };
        let mut request = request.with_method(page.method);
        if let Some(accept) = &page.accept {
            request = request.with_header("accept", accept);
        }

        // Offline fallback navigations belong to the redirector.
        let tracks = matches!(self.runtime, Runtime::Worker(_)) || self.connectivity.is_online();
        let location = (page.navigate && tracks).then(|| path_of(&request.url));
        let served = self.runtime.interceptor().intercept(request).await?;

        if let Some(location) = location
            && served.response.is_success()
            && served.source != Source::OfflinePage
        {
            self.navigator.navigate(&location);
        }
        Ok(served)
    }

    pub async fn add_note(&self, text: &str) -> Result<SavedNote, Error> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("note text cannot be empty".into()));
        }
        self.notes.save(text, self.connectivity.is_online()).await
    }

    /// Newest first, filtered or not.
    pub async fn list_notes(&self, synced: Option<bool>) -> Result<Vec<Note>, Error> {
        match synced {
            Some(synced) => {
                let mut notes = self.db.get_notes_by_synced(synced).await?;
                notes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
                Ok(notes)
            }
            None => self.db.get_all_notes().await,
        }
    }

    /// Run a sync pass now.
    pub async fn sync_notes(&self) -> Result<SyncOutcome, Error> {
        match &self.runtime {
            Runtime::Worker(worker) => Ok(worker.handle_sync(SYNC_TAG).await?.unwrap_or_default()),
            Runtime::Fallback(_) => self.notes.sync().await,
        }
    }

    /// Report a connectivity change to the runtime.
    pub async fn set_online(&self, online: bool) -> NetworkChange {
        let changed = self.connectivity.is_online() != online;
        match &self.runtime {
            Runtime::Worker(worker) => {
                self.connectivity.set_online(online);
                let syncs = if online {
                    worker
                        .flush_pending_syncs()
                        .await
                        .into_iter()
                        .filter_map(|r| r.ok().flatten())
                        .collect()
                } else {
                    Vec::new()
                };
                NetworkChange { online, changed, syncs, transition: None }
            }
            Runtime::Fallback(controller) => {
                let transition = if online { controller.on_online().await } else { controller.on_offline() };
                NetworkChange { online, changed, syncs: Vec::new(), transition: Some(transition) }
            }
        }
    }

    pub async fn status(&self) -> Result<HostStatus, Error> {
        let (worker_state, current_bucket, current_bucket_entries, quality, media_store) = match &self.runtime {
            Runtime::Worker(worker) => {
                let entries = match worker.bucket() {
                    Some(bucket) => Some(bucket.len().await?),
                    None => None,
                };
                (Some(worker.state().to_string()), Some(worker.bucket_name().to_string()), entries, None, None)
            }
            Runtime::Fallback(controller) => {
                let media = usage(controller.media().store()).await?;
                (None, None, None, Some(controller.probe().quality()), Some(media))
            }
        };

        let fallback_store = match &self.fallback_store {
            Some(store) => Some(usage(store).await?),
            None => None,
        };

        let messages = self
            .lock_messages()
            .iter()
            .filter_map(|m| serde_json::to_value(m).ok())
            .collect();

        Ok(HostStatus {
            mode: self.mode().to_string(),
            online: self.connectivity.is_online(),
            location: self.navigator.current(),
            worker_state,
            current_bucket,
            current_bucket_entries,
            buckets: self.db.bucket_names().await?,
            fallback_store,
            media_store,
            quality,
            sync_pending: self.notes.is_pending(SYNC_TAG),
            unsynced_notes: self.db.get_notes_by_synced(false).await?.len(),
            messages,
        })
    }

    fn lock_messages(&self) -> std::sync::MutexGuard<'_, VecDeque<WorkerMessage>> {
        self.messages.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn config_error(err: ConfigError) -> Error {
    Error::InvalidInput(err.to_string())
}

fn path_of(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

async fn usage(store: &RecordStore) -> Result<StoreUsage, Error> {
    Ok(StoreUsage {
        name: store.name().to_string(),
        records: store.count().await?,
        bytes: store.total_size().await?,
    })
}

/// Keep the latest worker messages the page received.
fn spawn_message_log(mut rx: broadcast::Receiver<WorkerMessage>, log: Arc<Mutex<VecDeque<WorkerMessage>>>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(message) => {
                    tracing::debug!(?message, "page received worker message");
                    let mut log = log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    if log.len() == MESSAGE_LOG {
                        log.pop_front();
                    }
                    log.push_back(message);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "page fell behind worker messages");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
