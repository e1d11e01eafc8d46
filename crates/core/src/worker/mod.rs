//! The caching worker: install, activate, fetch and sync.
//!
//! ### Install
//! Opens the bucket for the configured version and populates it from the
//! manifest with one task per asset. A failed asset (network error or non-2xx
//! status) is logged and counted; it never aborts the others. Failing to open
//! the bucket makes the worker redundant.
//!
//! ### Activate
//! Deletes every bucket other than the current one, then claims the
//! registered pages.
//!
//! ### Fetch
//! Only same-origin GET requests reach a strategy, and only once the worker
//! is active. Everything else goes to the network untouched.

pub mod clients;
pub mod lifecycle;
pub mod manifest;

pub use clients::{ClientRegistry, WorkerMessage};
pub use lifecycle::{LifecycleManager, WorkerState};
pub use manifest::{DEFAULT_MANIFEST, Manifest};

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use url::Url;

use crate::Error;
use crate::cache::{Bucket, ResourceCache, bucket_name};
use crate::http::{Method, Network, Request};
use crate::intercept::{RequestInterceptor, pass_through};
use crate::store::LocalDb;
use crate::strategy::{Admission, RoutePolicy, Served, StrategyContext};
use crate::sync_queue::{NoteQueue, SYNC_TAG, SyncOutcome};

const SYNC_COMPLETED_MESSAGE: &str = "notes synced";

/// Worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub origin: Url,
    pub cache_version: String,
    pub offline_path: String,
    pub manifest: Manifest,
    pub routes: RoutePolicy,
}

impl WorkerConfig {
    /// Default manifest, `/offline.html` and the built-in routing table.
    pub fn new(origin: Url, cache_version: impl Into<String>) -> Self {
        Self {
            origin,
            cache_version: cache_version.into(),
            offline_path: "/offline.html".to_string(),
            manifest: Manifest::default(),
            routes: RoutePolicy::worker_default(),
        }
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = manifest;
        self
    }
}

/// A manifest entry that could not be cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FailedAsset {
    pub url: String,
    pub reason: String,
}

/// Outcome of the install step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct InstallReport {
    pub bucket: String,
    pub total: usize,
    pub cached: usize,
    pub failed: Vec<FailedAsset>,
}

/// Outcome of the activate step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ActivateReport {
    pub deleted_buckets: Vec<String>,
    pub claimed_clients: usize,
}

pub struct Worker {
    db: LocalDb,
    network: Arc<dyn Network>,
    notes: Arc<NoteQueue>,
    config: WorkerConfig,
    bucket_name: String,
    offline_url: String,
    bucket: OnceLock<Bucket>,
    lifecycle: LifecycleManager,
    clients: ClientRegistry,
}

impl Worker {
    pub fn new(
        db: LocalDb, network: Arc<dyn Network>, notes: Arc<NoteQueue>, config: WorkerConfig,
    ) -> Result<Self, Error> {
        let offline_url = config
            .origin
            .join(&config.offline_path)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.offline_path)))?
            .to_string();
        Ok(Self {
            db,
            network,
            notes,
            bucket_name: bucket_name(&config.cache_version),
            offline_url,
            config,
            bucket: OnceLock::new(),
            lifecycle: LifecycleManager::new(),
            clients: ClientRegistry::new(),
        })
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Name of the bucket this worker version owns.
    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    /// The current bucket, once install has opened it.
    pub fn bucket(&self) -> Option<&Bucket> {
        self.bucket.get()
    }

    /// Install then activate.
    pub async fn start(&self) -> Result<(InstallReport, ActivateReport), Error> {
        let installed = self.install().await?;
        let activated = self.activate().await?;
        Ok((installed, activated))
    }

    pub async fn install(&self) -> Result<InstallReport, Error> {
        let state = self.lifecycle.state();
        if state != WorkerState::Installing {
            return Err(Error::InvalidTransition { from: state.to_string(), to: WorkerState::Waiting.to_string() });
        }
        tracing::info!(bucket = %self.bucket_name, "installing");
        self.lifecycle.skip_waiting();

        let prepared = async {
            let urls = self.config.manifest.resolve(&self.config.origin)?;
            let bucket = self.db.open_bucket(&self.bucket_name).await?;
            Ok::<_, Error>((urls, bucket))
        };
        let (urls, bucket) = match prepared.await {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::error!(bucket = %self.bucket_name, error = %e, "install failed, worker is redundant");
                self.lifecycle.transition(WorkerState::Redundant)?;
                return Err(e);
            }
        };

        let total = urls.len();
        let mut tasks = JoinSet::new();
        for url in urls {
            let network = Arc::clone(&self.network);
            let bucket = bucket.clone();
            tasks.spawn(async move {
                let result = precache(network.as_ref(), &bucket, &url).await;
                (url, result)
            });
        }

        let mut settled = 0;
        let mut cached = 0;
        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            settled += 1;
            match joined {
                Ok((url, Ok(()))) => {
                    cached += 1;
                    tracing::debug!(url = %url, settled, total, "asset cached");
                    self.clients.post_all(WorkerMessage::cache_progress(settled, total, url.as_str()));
                }
                Ok((url, Err(e))) => {
                    tracing::warn!(url = %url, error = %e, settled, total, "asset not cached");
                    failed.push(FailedAsset { url: url.to_string(), reason: e.to_string() });
                }
                Err(e) => {
                    tracing::error!(error = %e, "precache task aborted");
                    failed.push(FailedAsset { url: String::new(), reason: e.to_string() });
                }
            }
        }

        let _ = self.bucket.set(bucket);
        self.lifecycle.transition(WorkerState::Waiting)?;
        tracing::info!(bucket = %self.bucket_name, cached, failed = failed.len(), total, "install complete");
        Ok(InstallReport { bucket: self.bucket_name.clone(), total, cached, failed })
    }

    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.lifecycle.transition(WorkerState::Activating)?;

        let deleted = match self.delete_stale_buckets().await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::error!(error = %e, "activate failed, worker is redundant");
                self.lifecycle.transition(WorkerState::Redundant)?;
                return Err(e);
            }
        };

        let claimed = self.clients.claim();
        self.lifecycle.transition(WorkerState::Active)?;
        tracing::info!(bucket = %self.bucket_name, deleted = deleted.len(), claimed, "activated");
        Ok(ActivateReport { deleted_buckets: deleted, claimed_clients: claimed })
    }

    async fn delete_stale_buckets(&self) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.db.bucket_names().await? {
            if name == self.bucket_name {
                continue;
            }
            tracing::info!(bucket = %name, "deleting old bucket");
            if self.db.delete_bucket(&name).await? {
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Route a request through the worker.
    pub async fn handle_fetch(&self, request: Request) -> Result<Served, Error> {
        if request.method != Method::Get || !request.is_same_origin(&self.config.origin) {
            return pass_through(self.network.as_ref(), &request).await;
        }
        let bucket = match self.bucket.get() {
            Some(bucket) if self.lifecycle.is_active() => bucket,
            _ => {
                tracing::debug!(url = %request.url, state = %self.state(), "worker not active, passing through");
                return pass_through(self.network.as_ref(), &request).await;
            }
        };

        let strategy = self.config.routes.strategy_for(&request.url);
        tracing::debug!(url = %request.url, %strategy, "intercepted");
        let ctx = StrategyContext {
            cache: bucket,
            network: self.network.as_ref(),
            offline_url: &self.offline_url,
            admission: Admission::OkBasic,
        };
        ctx.run(strategy, &request).await
    }

    /// Handle a background sync event. Unknown tags are ignored.
    pub async fn handle_sync(&self, tag: &str) -> Result<Option<SyncOutcome>, Error> {
        if tag != SYNC_TAG {
            tracing::debug!(tag, "ignoring unknown sync tag");
            return Ok(None);
        }
        let outcome = self.notes.sync().await?;
        if outcome.marked > 0 {
            self.clients.post_all(WorkerMessage::SyncCompleted { message: SYNC_COMPLETED_MESSAGE.to_string() });
        }
        Ok(Some(outcome))
    }

    /// Fire every registered sync tag (connectivity came back).
    pub async fn flush_pending_syncs(&self) -> Vec<Result<Option<SyncOutcome>, Error>> {
        let mut results = Vec::new();
        for tag in self.notes.take_pending() {
            let result = self.handle_sync(&tag).await;
            if let Err(e) = &result {
                tracing::warn!(tag, error = %e, "background sync failed");
            }
            results.push(result);
        }
        results
    }
}

async fn precache(network: &dyn Network, bucket: &Bucket, url: &Url) -> Result<(), Error> {
    let response = network.fetch(&Request::get(url.clone())).await?;
    if !response.is_success() {
        return Err(Error::HttpError(format!("{url}: status {}", response.status)));
    }
    bucket.put(url.as_str(), &response).await
}

#[async_trait::async_trait]
impl RequestInterceptor for Worker {
    async fn intercept(&self, request: Request) -> Result<Served, Error> {
        self.handle_fetch(request).await
    }

    fn mode(&self) -> &'static str {
        "worker"
    }
}
